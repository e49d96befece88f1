use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Stream adaptor that pauses after every `every` items.
    ///
    /// A pause is a single `Poll::Pending` with the task's waker already
    /// signalled, so the task is rescheduled on the next turn of the executor
    /// and any other ready task gets to run first. The inner stream is not
    /// polled while paused.
    ///
    /// Use [`PacedExt::paced`] to construct one.
    #[must_use = "streams do nothing unless polled"]
    pub struct Paced<S> {
        #[pin]
        inner: S,
        every: usize,
        since_pause: usize,
        pauses: usize,
    }
}

impl<S> Paced<S> {
    /// Wrap `inner`, pausing after every `every` items. An interval of zero is
    /// treated as one.
    pub fn new(inner: S, every: usize) -> Self {
        Self { inner, every: every.max(1), since_pause: 0, pauses: 0 }
    }

    /// Number of times the stream has paused so far.
    pub fn pauses(&self) -> usize {
        self.pauses
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Stream> Stream for Paced<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.since_pause >= *this.every {
            *this.since_pause = 0;
            *this.pauses += 1;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(item)) => {
                *this.since_pause += 1;
                Poll::Ready(Some(item))
            },
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Extension trait adding [`paced`](PacedExt::paced) to every [`Stream`].
pub trait PacedExt: Stream + Sized {
    fn paced(self, every: usize) -> Paced<Self> {
        Paced::new(self, every)
    }
}
impl<S: Stream> PacedExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt, stream};
    use rstest::rstest;

    #[tokio::test]
    async fn yields_every_item_in_order() {
        let items: Vec<_> = stream::iter(0..25).paced(10).collect().await;
        assert_eq!(items, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn pauses_exactly_once_at_each_interval() {
        let mut paced = stream::iter(0..12).paced(5);
        for expected in 0..5 {
            assert_eq!(paced.next().now_or_never(), Some(Some(expected)));
        }
        // Sixth poll hands control back instead of producing an item.
        assert_eq!(paced.next().now_or_never(), None);
        assert_eq!(paced.pauses(), 1);
        assert_eq!(paced.next().now_or_never(), Some(Some(5)));
    }

    #[rstest]
    #[case(0, 10, 0)]
    #[case(9, 10, 0)]
    #[case(10, 10, 1)]
    #[case(25, 10, 2)]
    #[case(32, 10, 3)]
    #[case(7, 1, 7)]
    #[tokio::test]
    async fn pause_count(#[case] items: usize, #[case] every: usize, #[case] expected: usize) {
        let mut paced = stream::iter(0..items).paced(every);
        while paced.next().await.is_some() {}
        assert_eq!(paced.pauses(), expected);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let mut paced = stream::iter(0..2).paced(0);
        assert_eq!(paced.next().now_or_never(), Some(Some(0)));
        assert_eq!(paced.next().now_or_never(), None);
        assert_eq!(paced.next().now_or_never(), Some(Some(1)));
    }
}
