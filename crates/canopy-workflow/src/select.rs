//! Ordered polling over a node's event sources.

use std::task::{Context, Poll};

/// Poll `sources` in order and return the first ready result.
///
/// Sources after the first ready one are not polled, so they keep whatever
/// they were about to produce for a later tick. Every pending source
/// registers `cx`'s waker, so the caller is woken when any of them
/// progresses.
pub(crate) fn poll_first<I, T>(
  sources: I,
  cx: &mut Context<'_>,
  mut poll: impl FnMut(I::Item, &mut Context<'_>) -> Poll<T>,
) -> Poll<T>
where
  I: IntoIterator,
{
  for source in sources {
    if let Poll::Ready(value) = poll(source, cx) {
      return Poll::Ready(value);
    }
  }
  Poll::Pending
}

#[cfg(test)]
mod tests {
  use std::task::Waker;

  use super::*;

  #[test]
  fn first_ready_source_wins_and_later_ones_are_untouched() {
    let mut cx = Context::from_waker(Waker::noop());
    let mut polled = Vec::new();
    let sources = [Poll::Pending, Poll::Ready("b"), Poll::Ready("c")];

    let result = poll_first(sources.iter().enumerate(), &mut cx, |(index, source), _| {
      polled.push(index);
      *source
    });

    assert_eq!(result, Poll::Ready("b"));
    assert_eq!(polled, vec![0, 1]);
  }

  #[test]
  fn all_pending_is_pending() {
    let mut cx = Context::from_waker(Waker::noop());
    let result = poll_first([Poll::<u8>::Pending; 3], &mut cx, |source, _| source);
    assert!(result.is_pending());
  }
}
