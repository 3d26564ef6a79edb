//! Partitioning of an ordered message sequence by author.

use crate::types::Message;

/// Group messages by sender, preserving message order within each group
/// and first-appearance order of the senders themselves. Messages without
/// a sender are skipped, not treated as errors.
pub fn group_by_sender(messages: &[Message]) -> Vec<(String, Vec<Message>)> {
    let mut groups: Vec<(String, Vec<Message>)> = Vec::new();
    let mut skipped = 0usize;

    for message in messages {
        if message.sender.is_empty() {
            skipped += 1;
            continue;
        }
        match groups.iter_mut().find(|(sender, _)| *sender == message.sender) {
            Some((_, group)) => group.push(message.clone()),
            None => groups.push((message.sender.clone(), vec![message.clone()])),
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, "Skipped messages without a sender");
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, text: &str) -> Message {
        Message {
            sender: sender.to_string(),
            text: text.to_string(),
            time: None,
        }
    }

    #[test]
    fn senders_keep_first_appearance_order() {
        let messages = vec![
            msg("Ирина", "привет"),
            msg("Алексей", "добрый день"),
            msg("Ирина", "как дела?"),
        ];
        let groups = group_by_sender(&messages);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Ирина");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "Алексей");
    }

    #[test]
    fn message_order_within_group_is_preserved() {
        let messages = vec![msg("a", "1"), msg("b", "x"), msg("a", "2"), msg("a", "3")];
        let groups = group_by_sender(&messages);
        let texts: Vec<&str> = groups[0].1.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }

    #[test]
    fn missing_sender_is_dropped() {
        let messages = vec![msg("", "кто это"), msg("a", "я")];
        let groups = group_by_sender(&messages);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "a");
    }
}
