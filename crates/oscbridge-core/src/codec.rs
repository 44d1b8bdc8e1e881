//! OSC binary codec
//!
//! Wire layout of a message:
//!
//! ```text
//! address\0[pad] ,tags\0[pad] payload...
//! ```
//!
//! Every zero-terminated string is padded with zeros to a 4-byte boundary, with
//! at least one terminating zero. Numeric payloads are big-endian.
//!
//! A bundle is `#bundle\0`, an 8-byte time tag and a sequence of elements, each
//! prefixed with its size as a big-endian `i32`. Elements are messages or
//! nested bundles.
//!
//! Decoding is total: truncated or malformed input yields the longest prefix
//! that could be parsed, and an empty address when nothing usable was found.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{Argument, Message};
use crate::{Error, Result, BUNDLE_MARKER};

/// Bundle marker plus time tag
pub const BUNDLE_HEADER_LEN: usize = 16;

/// Time tag meaning "process immediately"
pub const IMMEDIATELY: u64 = 1;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Decode a single OSC message
///
/// Returns [`Message::empty`] when the buffer is shorter than 4 bytes or the
/// address is not terminated. Argument decoding stops at the first argument
/// that does not fit in the remaining bytes or whose tag is not supported;
/// everything decoded before it is kept.
pub fn decode_message(buf: &[u8]) -> Message {
    if buf.len() < 4 {
        return Message::empty();
    }

    let address_end = match find_zero(buf, 0) {
        Some(end) => end,
        None => return Message::empty(),
    };
    let address = read_str(buf, 0, address_end);
    let mut cursor = padded_end(address_end);

    // A message without a type tag string is still valid
    if buf.get(cursor) != Some(&b',') {
        return Message::bare(address);
    }
    cursor += 1;

    let tags_end = match find_zero(buf, cursor) {
        Some(end) => end,
        None => return Message::bare(address),
    };
    let tags = &buf[cursor..tags_end];
    cursor = padded_end(tags_end);

    let mut args = Vec::with_capacity(tags.len());
    for &tag in tags {
        match decode_arg(buf, tag, cursor) {
            Some((arg, next)) => {
                args.push(arg);
                cursor = next;
            }
            None => break,
        }
    }

    Message { address, args }
}

/// Decode an OSC packet into a flat list of messages
///
/// Non-bundle packets decode as one message. Bundles are flattened depth-first
/// in wire order; their time tags are ignored. Elements with an empty address
/// are dropped, and a size prefix that is non-positive or overruns the buffer
/// ends the bundle.
pub fn decode_bundle(buf: &[u8]) -> Vec<Message> {
    let mut messages = Vec::new();

    if buf.len() < BUNDLE_MARKER.len() {
        return messages;
    }

    if is_bundle(buf) {
        collect_bundle(buf, &mut messages);
    } else {
        push_message(buf, &mut messages);
    }

    messages
}

/// Check for the bundle marker
#[inline]
pub fn is_bundle(buf: &[u8]) -> bool {
    buf.starts_with(BUNDLE_MARKER)
}

/// Encode a message
///
/// Fails only when the address or a string argument contains a zero byte.
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(estimate_message_size(message));

    write_padded_str(&mut buf, "address", &message.address)?;

    let mut tags = Vec::with_capacity(message.args.len() + 1);
    tags.push(b',');
    tags.extend(message.args.iter().map(Argument::type_tag));
    write_padded(&mut buf, &tags);

    for arg in &message.args {
        match arg {
            Argument::Int(i) => buf.put_i32(*i),
            Argument::Long(l) => buf.put_i64(*l),
            Argument::Float(f) => buf.put_f32(*f),
            Argument::Double(d) => buf.put_f64(*d),
            Argument::String(s) => write_padded_str(&mut buf, "string argument", s)?,
            // Zero-width: the tag carries the value
            Argument::Bool(_) | Argument::Nil => {}
        }
    }

    Ok(buf.freeze())
}

/// Wrap already-encoded packets in a bundle
pub fn encode_bundle(time_tag: u64, elements: &[Bytes]) -> Result<Bytes> {
    let body: usize = elements.iter().map(|e| e.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(BUNDLE_HEADER_LEN + body);

    buf.put_slice(BUNDLE_MARKER);
    buf.put_u64(time_tag);

    for element in elements {
        let size = i32::try_from(element.len()).map_err(|_| Error::PacketTooLarge(element.len()))?;
        buf.put_i32(size);
        buf.put_slice(element);
    }

    Ok(buf.freeze())
}

/// First 4-byte boundary strictly after a terminating zero at `terminator`
#[inline]
pub fn padded_end(terminator: usize) -> usize {
    (terminator + 4) & !3
}

// ============================================================================
// DECODING HELPERS
// ============================================================================

fn collect_bundle(buf: &[u8], out: &mut Vec<Message>) {
    let mut cursor = BUNDLE_HEADER_LEN;

    while let Some(size) = fixed::<4>(buf, cursor) {
        let size = i32::from_be_bytes(size);
        cursor += 4;

        if size <= 0 {
            break;
        }
        let end = match cursor.checked_add(size as usize) {
            Some(end) if end <= buf.len() => end,
            _ => break,
        };

        // Each element is a strict sub-slice, so recursion always terminates
        let element = &buf[cursor..end];
        if is_bundle(element) {
            collect_bundle(element, out);
        } else {
            push_message(element, out);
        }

        cursor = end;
    }
}

fn push_message(buf: &[u8], out: &mut Vec<Message>) {
    let message = decode_message(buf);
    if !message.is_empty() {
        out.push(message);
    }
}

/// Decode one argument at `cursor`, returning it with the next cursor
fn decode_arg(buf: &[u8], tag: u8, cursor: usize) -> Option<(Argument, usize)> {
    let decoded = match tag {
        b'f' => (Argument::Float(f32::from_be_bytes(fixed(buf, cursor)?)), cursor + 4),
        b'i' => (Argument::Int(i32::from_be_bytes(fixed(buf, cursor)?)), cursor + 4),
        b'd' => (Argument::Double(f64::from_be_bytes(fixed(buf, cursor)?)), cursor + 8),
        b'h' => (Argument::Long(i64::from_be_bytes(fixed(buf, cursor)?)), cursor + 8),
        b's' => {
            let end = find_zero(buf, cursor)?;
            (Argument::String(read_str(buf, cursor, end)), padded_end(end))
        }
        b'T' => (Argument::Bool(true), cursor),
        b'F' => (Argument::Bool(false), cursor),
        b'N' => (Argument::Nil, cursor),
        // Width unknown, nothing after this can be located
        _ => return None,
    };
    Some(decoded)
}

#[inline]
fn fixed<const N: usize>(buf: &[u8], at: usize) -> Option<[u8; N]> {
    buf.get(at..at.checked_add(N)?)?.try_into().ok()
}

#[inline]
fn find_zero(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == 0)
        .map(|p| p + from)
}

#[inline]
fn read_str(buf: &[u8], start: usize, end: usize) -> String {
    String::from_utf8_lossy(&buf[start..end]).into_owned()
}

// ============================================================================
// ENCODING HELPERS
// ============================================================================

fn estimate_message_size(message: &Message) -> usize {
    let payload: usize = message
        .args
        .iter()
        .map(|arg| match arg {
            Argument::Int(_) | Argument::Float(_) => 4,
            Argument::Long(_) | Argument::Double(_) => 8,
            Argument::String(s) => s.len() + 4,
            Argument::Bool(_) | Argument::Nil => 0,
        })
        .sum();
    message.address.len() + 4 + message.args.len() + 5 + payload
}

fn write_padded_str(buf: &mut BytesMut, field: &'static str, s: &str) -> Result<()> {
    if let Some(position) = s.bytes().position(|b| b == 0) {
        return Err(Error::InvalidString { field, position });
    }
    write_padded(buf, s.as_bytes());
    Ok(())
}

/// Write bytes followed by 1 to 4 zeros, ending on a 4-byte boundary
fn write_padded(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_slice(bytes);
    buf.put_bytes(0, 4 - bytes.len() % 4);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoom_packet() -> Vec<u8> {
        let mut buf = b"/fractal/zoom\0\0\0,f\0\0".to_vec();
        buf.extend_from_slice(&2.5f32.to_be_bytes());
        buf
    }

    #[test]
    fn test_padded_end() {
        assert_eq!(padded_end(0), 4);
        assert_eq!(padded_end(2), 4);
        assert_eq!(padded_end(3), 4);
        assert_eq!(padded_end(4), 8);
        assert_eq!(padded_end(13), 16);
    }

    #[test]
    fn test_decode_float_message() {
        let msg = decode_message(&zoom_packet());
        assert_eq!(msg.address, "/fractal/zoom");
        assert_eq!(msg.args, vec![Argument::Float(2.5)]);
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(decode_message(&[0x00, 0x00]), Message::empty());
        assert_eq!(decode_message(&[]), Message::empty());
    }

    #[test]
    fn test_decode_unterminated_address() {
        assert_eq!(decode_message(b"/no/terminator"), Message::empty());
    }

    #[test]
    fn test_decode_address_only() {
        let msg = decode_message(b"/fractal/reset\0\0");
        assert_eq!(msg, Message::bare("/fractal/reset"));
    }

    #[test]
    fn test_decode_missing_tag_prefix() {
        let msg = decode_message(b"/a\0\0xf\0\0\0\0\0\0");
        assert_eq!(msg, Message::bare("/a"));
    }

    #[test]
    fn test_decode_unterminated_tags() {
        let msg = decode_message(b"/a\0\0,ff");
        assert_eq!(msg, Message::bare("/a"));
    }

    #[test]
    fn test_decode_truncated_argument() {
        // Declares two ints but carries one and a half
        let mut buf = b"/b\0\0,ii\0".to_vec();
        buf.extend_from_slice(&7i32.to_be_bytes());
        buf.extend_from_slice(&[0, 1]);
        let msg = decode_message(&buf);
        assert_eq!(msg.address, "/b");
        assert_eq!(msg.args, vec![Argument::Int(7)]);
    }

    #[test]
    fn test_decode_unknown_tag_stops_arguments() {
        let mut buf = b"/c\0\0,ixi\0\0\0\0".to_vec();
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.extend_from_slice(&[0xAA; 4]);
        buf.extend_from_slice(&3i32.to_be_bytes());
        let msg = decode_message(&buf);
        assert_eq!(msg.args, vec![Argument::Int(1)]);
    }

    #[test]
    fn test_decode_zero_width_tags() {
        let mut buf = b"/z\0\0,TFNi\0\0\0".to_vec();
        buf.extend_from_slice(&(-4i32).to_be_bytes());
        let msg = decode_message(&buf);
        assert_eq!(
            msg.args,
            vec![
                Argument::Bool(true),
                Argument::Bool(false),
                Argument::Nil,
                Argument::Int(-4),
            ]
        );
    }

    #[test]
    fn test_decode_string_then_float() {
        let mut buf = b"/s\0\0,sf\0abcd\0\0\0\0".to_vec();
        buf.extend_from_slice(&0.5f32.to_be_bytes());
        let msg = decode_message(&buf);
        assert_eq!(
            msg.args,
            vec![Argument::String("abcd".into()), Argument::Float(0.5)]
        );
    }

    #[test]
    fn test_decode_wide_types() {
        let mut buf = b"/w\0\0,dh\0".to_vec();
        buf.extend_from_slice(&1.25f64.to_be_bytes());
        buf.extend_from_slice(&(-9_000_000_000i64).to_be_bytes());
        let msg = decode_message(&buf);
        assert_eq!(
            msg.args,
            vec![Argument::Double(1.25), Argument::Long(-9_000_000_000)]
        );
    }

    #[test]
    fn test_encode_layout() {
        let msg = Message::new("/fractal/zoom", vec![Argument::Float(2.5)]);
        let encoded = encode_message(&msg).unwrap();
        assert_eq!(encoded.as_ref(), zoom_packet().as_slice());
    }

    #[test]
    fn test_encode_aligned_address_gets_full_pad() {
        let encoded = encode_message(&Message::bare("/abc")).unwrap();
        assert_eq!(encoded.as_ref(), b"/abc\0\0\0\0,\0\0\0");
    }

    #[test]
    fn test_encode_bool_has_no_payload() {
        let msg = Message::new("/t", vec![Argument::Bool(true), Argument::Bool(false)]);
        let encoded = encode_message(&msg).unwrap();
        assert_eq!(encoded.as_ref(), b"/t\0\0,TF\0");
    }

    #[test]
    fn test_encode_rejects_zero_in_string() {
        let msg = Message::new("/t", vec![Argument::String("a\0b".into())]);
        assert_eq!(
            encode_message(&msg),
            Err(Error::InvalidString {
                field: "string argument",
                position: 1
            })
        );

        let err = encode_message(&Message::bare("/bad\0addr")).unwrap_err();
        assert!(matches!(err, Error::InvalidString { field: "address", .. }));
    }

    #[test]
    fn test_bundle_example() {
        let a = encode_message(&Message::bare("/a")).unwrap();
        let b = encode_message(&Message::new("/b", vec![Argument::Int(7)])).unwrap();
        let bundle = encode_bundle(IMMEDIATELY, &[a, b]).unwrap();

        let messages = decode_bundle(&bundle);
        assert_eq!(
            messages,
            vec![
                Message::bare("/a"),
                Message::new("/b", vec![Argument::Int(7)]),
            ]
        );
    }

    #[test]
    fn test_bundle_short_buffer() {
        assert!(decode_bundle(b"#bund").is_empty());
        assert!(decode_bundle(b"/a\0\0").is_empty());
    }

    #[test]
    fn test_bundle_header_only() {
        assert!(decode_bundle(b"#bundle\0").is_empty());
        assert!(decode_bundle(&encode_bundle(0, &[]).unwrap()).is_empty());
    }

    #[test]
    fn test_bundle_non_positive_size_stops() {
        let a = encode_message(&Message::bare("/a")).unwrap();
        let mut buf = encode_bundle(0, &[a]).unwrap().to_vec();
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&encode_message(&Message::bare("/never")).unwrap());

        assert_eq!(decode_bundle(&buf), vec![Message::bare("/a")]);
    }

    #[test]
    fn test_bundle_overrun_keeps_prefix() {
        let a = encode_message(&Message::bare("/a")).unwrap();
        let mut buf = encode_bundle(0, &[a]).unwrap().to_vec();
        buf.extend_from_slice(&64i32.to_be_bytes());
        buf.extend_from_slice(b"/cut\0\0\0\0");

        assert_eq!(decode_bundle(&buf), vec![Message::bare("/a")]);
    }

    #[test]
    fn test_bundle_drops_unparseable_elements() {
        let garbage = Bytes::from_static(&[0u8; 8]);
        let b = encode_message(&Message::bare("/b")).unwrap();
        let bundle = encode_bundle(0, &[garbage, b]).unwrap();

        assert_eq!(decode_bundle(&bundle), vec![Message::bare("/b")]);
    }

    #[test]
    fn test_plain_message_through_decode_bundle() {
        assert_eq!(
            decode_bundle(&zoom_packet()),
            vec![Message::new("/fractal/zoom", vec![Argument::Float(2.5)])]
        );
    }
}
