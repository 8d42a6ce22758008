use flume::{Receiver, Sender};
use log::trace;
use rfgen_messages::Event;

/// Fan-out of generator events to any number of subscribers.
///
/// Every subscriber gets its own unbounded channel, so events are seen in
/// emission order and a slow reader never blocks the control sequence.
/// Subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Vec<Sender<Event>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe and queue `first` ahead of any later event.
    pub fn subscribe_with(&mut self, first: Event) -> Receiver<Event> {
        let (tx, rx) = flume::unbounded();
        let _ = tx.send(first);
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: Event) {
        trace!("Emitting {:?}", event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfgen_messages::Hertz;

    #[test]
    fn test_every_subscriber_sees_events_in_order() {
        let mut notifier = Notifier::new();
        let a = notifier.subscribe_with(Event::Disconnected);
        let b = notifier.subscribe_with(Event::Disconnected);

        notifier.emit(Event::PowerChanged(true));
        notifier.emit(Event::FrequencyChanged(Hertz::mhz(5)));

        for rx in [a, b] {
            assert_eq!(rx.try_recv(), Ok(Event::Disconnected));
            let events: Vec<Event> = rx.try_iter().collect();
            assert_eq!(
                events,
                vec![Event::PowerChanged(true), Event::FrequencyChanged(Hertz::mhz(5))]
            );
        }
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut notifier = Notifier::new();
        let kept = notifier.subscribe_with(Event::FmStopped);
        drop(notifier.subscribe_with(Event::FmStopped));
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.emit(Event::Disconnected);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(
            kept.try_iter().collect::<Vec<_>>(),
            vec![Event::FmStopped, Event::Disconnected]
        );
    }

    #[test]
    fn test_subscribe_with_queues_first_event() {
        let mut notifier = Notifier::new();
        let rx = notifier.subscribe_with(Event::FmStopped);
        notifier.emit(Event::PowerChanged(false));
        assert_eq!(rx.try_recv(), Ok(Event::FmStopped));
        assert_eq!(rx.try_recv(), Ok(Event::PowerChanged(false)));
    }
}
