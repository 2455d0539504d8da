use dynamiq_core::message::MessageId;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Messages handed to a consumer on this node, hidden from later reads until their
/// visibility timeout runs out or they are deleted.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    hidden: Mutex<BTreeMap<MessageId, Instant>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of hidden ids within `[low, high]`.
    pub(crate) async fn hidden_in(&self, low: u64, high: u64) -> usize {
        if low > high {
            return 0;
        }
        let mut hidden = self.hidden.lock().await;
        expire(&mut hidden, Instant::now());
        hidden
            .range(MessageId::new(low)..=MessageId::new(high))
            .count()
    }

    /// Take up to `limit` of `ids` that are not hidden, in order, and hide them for `visibility`.
    pub(crate) async fn claim(
        &self,
        ids: &[MessageId],
        limit: usize,
        visibility: Duration,
    ) -> Vec<MessageId> {
        let mut hidden = self.hidden.lock().await;
        let now = Instant::now();
        expire(&mut hidden, now);

        let claimed: Vec<MessageId> = ids
            .iter()
            .copied()
            .filter(|id| !hidden.contains_key(id))
            .take(limit)
            .collect();
        let until = now + visibility;
        for id in &claimed {
            hidden.insert(*id, until);
        }
        claimed
    }

    pub(crate) async fn hide(&self, ids: impl IntoIterator<Item = MessageId>, visibility: Duration) {
        let until = Instant::now() + visibility;
        let mut hidden = self.hidden.lock().await;
        for id in ids {
            hidden.insert(id, until);
        }
    }

    pub(crate) async fn forget(&self, id: MessageId) {
        self.hidden.lock().await.remove(&id);
    }
}

fn expire(hidden: &mut BTreeMap<MessageId, Instant>, now: Instant) {
    hidden.retain(|_, until| *until > now);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<MessageId> {
        raw.iter().copied().map(MessageId::new).collect()
    }

    #[tokio::test]
    async fn claimed_ids_are_hidden_until_they_expire() {
        let in_flight = InFlight::new();
        let visibility = Duration::from_millis(30);

        let claimed = in_flight.claim(&ids(&[10, 20, 30]), 2, visibility).await;
        assert_eq!(claimed, ids(&[10, 20]));
        assert_eq!(in_flight.hidden_in(0, 100).await, 2);
        assert_eq!(in_flight.hidden_in(15, 100).await, 1);

        let claimed = in_flight.claim(&ids(&[10, 20, 30]), 5, visibility).await;
        assert_eq!(claimed, ids(&[30]));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(in_flight.hidden_in(0, 100).await, 0);
        let claimed = in_flight.claim(&ids(&[10, 20, 30]), 5, visibility).await;
        assert_eq!(claimed, ids(&[10, 20, 30]));
    }

    #[tokio::test]
    async fn forgotten_ids_are_visible_again() {
        let in_flight = InFlight::new();
        in_flight.hide(ids(&[7, 8]), Duration::from_secs(5)).await;
        in_flight.forget(MessageId::new(7)).await;

        let claimed = in_flight.claim(&ids(&[7, 8]), 5, Duration::from_secs(5)).await;
        assert_eq!(claimed, ids(&[7]));
    }
}
