//! Exact nearest-neighbor index over L2-normalized vectors.
//!
//! Distances are squared L2, which on normalized vectors ranks identically
//! to cosine distance. The on-disk format is a small little-endian binary
//! file: magic, dimension, count, then the flattened vector data.

use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: &[u8; 8] = b"SVIDX001";

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major, `len * dimension` values.
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(anyhow!(
                    "Vector {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    dimension
                ));
            }
            data.extend_from_slice(vector);
        }
        Ok(Self { dimension, data })
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Exact search: up to `min(k, len)` (index, squared-L2-distance)
    /// pairs in ascending-distance order. Never errors; an empty index or
    /// `k = 0` returns an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.is_empty() || k == 0 || query.len() != self.dimension {
            if !self.is_empty() && query.len() != self.dimension {
                tracing::warn!(
                    query_dim = query.len(),
                    index_dim = self.dimension,
                    "Query dimension mismatch, returning no neighbors"
                );
            }
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| {
                let row = &self.data[i * self.dimension..(i + 1) * self.dimension];
                let dist: f32 = row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (i, dist)
            })
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Persist the index. The write is atomic (temp file + rename) so a
    /// crashed build never leaves a half-written artifact behind.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("index.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            file.write_all(MAGIC)?;
            file.write_all(&(self.dimension as u32).to_le_bytes())?;
            file.write_all(&(self.len() as u32).to_le_bytes())?;
            for value in &self.data {
                file.write_all(&value.to_le_bytes())?;
            }
        }
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move index into place: {}", path.display()))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open index: {}", path.display()))?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(anyhow!("Bad index magic in {}", path.display()));
        }

        let mut header = [0u8; 4];
        file.read_exact(&mut header)?;
        let dimension = u32::from_le_bytes(header) as usize;
        file.read_exact(&mut header)?;
        let count = u32::from_le_bytes(header) as usize;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        let expected = count * dimension * 4;
        if raw.len() != expected {
            return Err(anyhow!(
                "Index data is {} bytes, expected {} ({} x {})",
                raw.len(),
                expected,
                count,
                dimension
            ));
        }

        let data = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        FlatIndex::from_vectors(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.7071, 0.7071],
        ])
        .unwrap()
    }

    #[test]
    fn search_returns_ascending_distances() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
        assert_eq!(hits[1].0, 2); // diagonal is closer than orthogonal
    }

    #[test]
    fn k_is_bounded_by_index_size() {
        let index = FlatIndex::from_vectors(vec![vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.search(&[0.5, 0.5], 3).len(), 1);
    }

    #[test]
    fn empty_index_and_zero_k_return_nothing() {
        let empty = FlatIndex::from_vectors(Vec::new()).unwrap();
        assert!(empty.search(&[1.0], 3).is_empty());
        assert!(sample_index().search(&[1.0, 0.0], 0).is_empty());
    }

    #[test]
    fn mismatched_vector_dimension_is_rejected() {
        assert!(FlatIndex::from_vectors(vec![vec![1.0, 0.0], vec![1.0]]).is_err());
    }

    #[test]
    fn disk_round_trip_preserves_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.index");

        let index = sample_index();
        index.write_to(&path).unwrap();
        let loaded = FlatIndex::read_from(&path).unwrap();

        assert_eq!(index, loaded);
        assert_eq!(loaded.vector(2).unwrap(), &[0.7071, 0.7071]);
    }

    #[test]
    fn truncated_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.index");
        sample_index().write_to(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(FlatIndex::read_from(&path).is_err());
    }
}
