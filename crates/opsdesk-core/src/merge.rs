//! Delta-merge routines. Poll results and transport pushes are two producers
//! feeding the same cache; both funnel through these functions so partial
//! writes can never race and duplicates can never render.

use crate::models::{Message, Notification};

/// Merge newly fetched or pushed messages into an ordered cache. Items are
/// keyed by id; the read flag is monotonic and never cleared by a merge. The
/// merged set is re-sorted by (timestamp, id) rather than appended on
/// arrival, so out-of-order responses cannot violate ascending order.
/// Returns true when anything changed.
pub(crate) fn merge_messages<I>(cache: &mut Vec<Message>, incoming: I) -> bool
where
    I: IntoIterator<Item = Message>,
{
    let mut changed = false;
    for msg in incoming {
        match cache.iter_mut().find(|m| m.id == msg.id) {
            Some(existing) => {
                if msg.read && !existing.read {
                    existing.read = true;
                    changed = true;
                }
            }
            None => {
                cache.push(msg);
                changed = true;
            }
        }
    }
    if changed {
        cache.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
    }
    changed
}

/// Same contract for notification copies; the feed keeps newest first.
pub(crate) fn merge_notifications<I>(cache: &mut Vec<Notification>, incoming: I) -> bool
where
    I: IntoIterator<Item = Notification>,
{
    let mut changed = false;
    for note in incoming {
        match cache.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => {
                if note.read && !existing.read {
                    existing.read = true;
                    changed = true;
                }
            }
            None => {
                cache.push(note);
                changed = true;
            }
        }
    }
    if changed {
        cache.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| a.id.cmp(&b.id)));
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationId, MessageId, UserId};
    use chrono::{Duration, Utc};

    fn msg(n: i64, read: bool) -> Message {
        Message {
            id: MessageId::generate(),
            conversation_id: ConversationId(uuid::Uuid::nil()),
            sender_id: UserId(2),
            recipient_id: UserId(3),
            text: format!("m{n}"),
            sent_at: Utc::now() + Duration::seconds(n),
            read,
        }
    }

    #[test]
    fn merge_deduplicates_and_sorts() {
        let a = msg(1, false);
        let b = msg(3, false);
        let c = msg(2, false);

        let mut cache = vec![a.clone(), b.clone()];
        // Out-of-order arrival plus a duplicate of an existing id.
        let changed = merge_messages(&mut cache, vec![c.clone(), a.clone()]);
        assert!(changed);
        assert_eq!(cache.len(), 3);
        assert!(cache.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
    }

    #[test]
    fn merge_never_clears_read_flags() {
        let mut read_msg = msg(1, true);
        let mut cache = vec![read_msg.clone()];

        // A stale copy with read=false must not regress the flag.
        read_msg.read = false;
        let changed = merge_messages(&mut cache, vec![read_msg]);
        assert!(!changed);
        assert!(cache[0].read);
    }

    #[test]
    fn merge_is_a_noop_for_identical_input() {
        let a = msg(1, false);
        let mut cache = vec![a.clone()];
        assert!(!merge_messages(&mut cache, vec![a]));
    }
}
