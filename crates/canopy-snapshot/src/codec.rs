//! Primitive encoders and decoders for snapshot bytes.
//!
//! Writers are extension methods on any [`BufMut`], readers are fallible
//! extension methods on any [`Buf`]. Every integer is a big-endian `i32`.

use bytes::{Buf, BufMut, Bytes};

use crate::SnapshotError;

/// An enum that is written to snapshots by its ordinal.
///
/// ```ignore
/// #[derive(Clone, Copy)]
/// enum Phase { Idle, Running }
///
/// impl EnumOrdinal for Phase {
///   const VALUES: &'static [Self] = &[Phase::Idle, Phase::Running];
///
///   fn ordinal(self) -> i32 {
///     self as i32
///   }
/// }
/// ```
pub trait EnumOrdinal: Copy + 'static {
  /// Every variant. Reading looks ordinals up here.
  const VALUES: &'static [Self];

  /// The value written for `self`. Must differ between variants.
  fn ordinal(self) -> i32;

  fn from_ordinal(ordinal: i32) -> Option<Self> {
    Self::VALUES
      .iter()
      .copied()
      .find(|value| value.ordinal() == ordinal)
  }
}

/// Lengths and counts are written as `i32`, so a single value or list holds
/// at most `i32::MAX` bytes or items. Past that the prefix no longer matches
/// the payload and reading the snapshot back fails.
fn length_prefix(len: usize) -> i32 {
  len as i32
}

/// Writers for the snapshot primitives.
pub trait SnapshotSink: BufMut + Sized {
  fn put_bool_as_i32(&mut self, value: bool) {
    self.put_i32(i32::from(value));
  }

  /// Raw IEEE-754 bits as an `i32`.
  fn put_f32_bits(&mut self, value: f32) {
    self.put_i32(value.to_bits() as i32);
  }

  /// An `i32` length followed by the bytes. `value` must be at most
  /// `i32::MAX` bytes long.
  fn put_bytes_with_length(&mut self, value: &[u8]) {
    self.put_i32(length_prefix(value.len()));
    self.put_slice(value);
  }

  fn put_utf8_with_length(&mut self, value: &str) {
    self.put_bytes_with_length(value.as_bytes());
  }

  /// A 0/1 flag followed by `value` when present.
  fn put_nullable<T>(&mut self, value: Option<T>, write: impl FnOnce(&mut Self, T)) {
    match value {
      Some(value) => {
        self.put_i32(1);
        write(self, value);
      }
      None => self.put_i32(0),
    }
  }

  fn put_optional_utf8_with_length(&mut self, value: Option<&str>) {
    self.put_nullable(value, |buf, value| buf.put_utf8_with_length(value));
  }

  fn put_enum_by_ordinal<E: EnumOrdinal>(&mut self, value: E) {
    self.put_i32(value.ordinal());
  }

  /// An `i32` count followed by each item. At most `i32::MAX` items.
  fn put_list<I>(&mut self, values: I, mut write: impl FnMut(&mut Self, I::Item))
  where
    I: IntoIterator,
    I::IntoIter: ExactSizeIterator,
  {
    let values = values.into_iter();
    self.put_i32(length_prefix(values.len()));
    for value in values {
      write(self, value);
    }
  }
}

impl<B: BufMut> SnapshotSink for B {}

/// Readers for the snapshot primitives.
///
/// Every reader checks the remaining length first and reports
/// [`SnapshotError::Truncated`] instead of panicking.
pub trait SnapshotSource: Buf + Sized {
  fn ensure_remaining(&self, needed: usize) -> Result<(), SnapshotError> {
    let remaining = self.remaining();
    if remaining < needed {
      return Err(SnapshotError::Truncated { needed, remaining });
    }
    Ok(())
  }

  fn read_i32(&mut self) -> Result<i32, SnapshotError> {
    self.ensure_remaining(4)?;
    Ok(self.get_i32())
  }

  fn read_bool_from_i32(&mut self) -> Result<bool, SnapshotError> {
    match self.read_i32()? {
      0 => Ok(false),
      1 => Ok(true),
      value => Err(SnapshotError::InvalidFlag { value }),
    }
  }

  fn read_f32_bits(&mut self) -> Result<f32, SnapshotError> {
    Ok(f32::from_bits(self.read_i32()? as u32))
  }

  fn read_bytes_with_length(&mut self) -> Result<Bytes, SnapshotError> {
    let length = self.read_i32()?;
    let len = usize::try_from(length).map_err(|_| SnapshotError::NegativeLength { length })?;
    self.ensure_remaining(len)?;
    Ok(self.copy_to_bytes(len))
  }

  fn read_utf8_with_length(&mut self) -> Result<String, SnapshotError> {
    let bytes = self.read_bytes_with_length()?;
    Ok(String::from_utf8(bytes.to_vec())?)
  }

  fn read_nullable<T>(
    &mut self,
    read: impl FnOnce(&mut Self) -> Result<T, SnapshotError>,
  ) -> Result<Option<T>, SnapshotError> {
    if self.read_bool_from_i32()? {
      read(self).map(Some)
    } else {
      Ok(None)
    }
  }

  fn read_optional_utf8_with_length(&mut self) -> Result<Option<String>, SnapshotError> {
    self.read_nullable(|src| src.read_utf8_with_length())
  }

  fn read_enum_by_ordinal<E: EnumOrdinal>(&mut self) -> Result<E, SnapshotError> {
    let ordinal = self.read_i32()?;
    E::from_ordinal(ordinal).ok_or(SnapshotError::InvalidOrdinal {
      ordinal,
      type_name: std::any::type_name::<E>(),
    })
  }

  fn read_list<T>(
    &mut self,
    mut read: impl FnMut(&mut Self) -> Result<T, SnapshotError>,
  ) -> Result<Vec<T>, SnapshotError> {
    let length = self.read_i32()?;
    let count = usize::try_from(length).map_err(|_| SnapshotError::NegativeLength { length })?;
    // Every item takes at least one byte, so the remaining length bounds the
    // allocation for hostile counts.
    let mut values = Vec::with_capacity(count.min(self.remaining()));
    for _ in 0..count {
      values.push(read(self)?);
    }
    Ok(values)
  }
}

impl<B: Buf> SnapshotSource for B {}

#[cfg(test)]
mod tests {
  use bytes::BytesMut;

  use super::*;

  #[derive(Debug, Clone, Copy, PartialEq)]
  enum Phase {
    Idle,
    Running,
    Done,
  }

  impl EnumOrdinal for Phase {
    const VALUES: &'static [Self] = &[Phase::Idle, Phase::Running, Phase::Done];

    fn ordinal(self) -> i32 {
      self as i32
    }
  }

  /// Ordinals that are not declaration indices.
  #[derive(Debug, Clone, Copy, PartialEq)]
  enum Level {
    Low,
    High,
  }

  impl EnumOrdinal for Level {
    const VALUES: &'static [Self] = &[Level::High, Level::Low];

    fn ordinal(self) -> i32 {
      match self {
        Level::Low => 10,
        Level::High => 20,
      }
    }
  }

  #[test]
  fn int32_is_big_endian() {
    let mut buf = BytesMut::new();
    buf.put_i32(258);
    buf.put_i32(-1);
    assert_eq!(buf.as_ref(), &[0, 0, 1, 2, 0xff, 0xff, 0xff, 0xff]);
  }

  #[test]
  fn utf8_with_length_layout() {
    let mut buf = BytesMut::new();
    buf.put_utf8_with_length("héllo");
    assert_eq!(
      buf.as_ref(),
      &[0, 0, 0, 6, b'h', 0xc3, 0xa9, b'l', b'l', b'o']
    );

    let mut src = buf.freeze();
    assert_eq!(src.read_utf8_with_length().unwrap(), "héllo");
    assert!(!src.has_remaining());
  }

  #[test]
  fn nullable_flag_layout() {
    let mut buf = BytesMut::new();
    buf.put_optional_utf8_with_length(None);
    buf.put_optional_utf8_with_length(Some("a"));
    assert_eq!(buf.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 1, b'a']);

    let mut src = buf.freeze();
    assert_eq!(src.read_optional_utf8_with_length().unwrap(), None);
    assert_eq!(
      src.read_optional_utf8_with_length().unwrap().as_deref(),
      Some("a")
    );
  }

  #[test]
  fn enum_ordinals() {
    let mut buf = BytesMut::new();
    buf.put_enum_by_ordinal(Phase::Done);
    buf.put_i32(9);
    assert_eq!(&buf[..4], &[0, 0, 0, 2]);

    let mut src = buf.freeze();
    assert_eq!(src.read_enum_by_ordinal::<Phase>().unwrap(), Phase::Done);
    let err = src.read_enum_by_ordinal::<Phase>().unwrap_err();
    assert!(matches!(err, SnapshotError::InvalidOrdinal { ordinal: 9, .. }));
  }

  #[test]
  fn explicit_ordinals_read_back() {
    let mut buf = BytesMut::new();
    buf.put_enum_by_ordinal(Level::Low);
    buf.put_enum_by_ordinal(Level::High);
    assert_eq!(buf.as_ref(), &[0, 0, 0, 10, 0, 0, 0, 20]);

    let mut src = buf.freeze();
    assert_eq!(src.read_enum_by_ordinal::<Level>().unwrap(), Level::Low);
    assert_eq!(src.read_enum_by_ordinal::<Level>().unwrap(), Level::High);
    assert!(Level::from_ordinal(0).is_none());
  }

  #[test]
  fn bools_floats_and_lists() {
    let mut buf = BytesMut::new();
    buf.put_bool_as_i32(true);
    buf.put_f32_bits(1.5);
    buf.put_list(["a", "bc"], |buf, item| buf.put_utf8_with_length(item));
    assert_eq!(&buf[4..8], &1.5f32.to_bits().to_be_bytes());

    let mut src = buf.freeze();
    assert!(src.read_bool_from_i32().unwrap());
    assert_eq!(src.read_f32_bits().unwrap(), 1.5);
    let items = src.read_list(|src| src.read_utf8_with_length()).unwrap();
    assert_eq!(items, vec!["a".to_string(), "bc".to_string()]);
  }

  #[test]
  fn truncated_input_is_an_error() {
    let mut src = Bytes::from_static(&[0, 0, 0]);
    assert!(matches!(
      src.read_i32(),
      Err(SnapshotError::Truncated {
        needed: 4,
        remaining: 3
      })
    ));

    let mut src = Bytes::from_static(&[0, 0, 0, 5, b'a']);
    assert!(matches!(
      src.read_bytes_with_length(),
      Err(SnapshotError::Truncated { needed: 5, .. })
    ));
  }

  #[test]
  fn malformed_values_are_errors() {
    let mut src = Bytes::from_static(&[0xff, 0xff, 0xff, 0xfe]);
    assert!(matches!(
      src.read_bytes_with_length(),
      Err(SnapshotError::NegativeLength { length: -2 })
    ));

    let mut src = Bytes::from_static(&[0, 0, 0, 2]);
    assert!(matches!(
      src.read_bool_from_i32(),
      Err(SnapshotError::InvalidFlag { value: 2 })
    ));

    let mut src = Bytes::from_static(&[0, 0, 0, 1, 0xff]);
    assert!(matches!(
      src.read_utf8_with_length(),
      Err(SnapshotError::InvalidUtf8 { .. })
    ));
  }
}
