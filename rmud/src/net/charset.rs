//! Character-set conversion at the network boundary.
//!
//! MUD servers in the wild stream HZ-GB-2312, GBK, GB18030, or Big5; the
//! terminal wants UTF-8. The transcoder resolves a configured encoding name
//! to a codec and converts each demultiplexed line inbound and each command
//! line outbound. Malformed sequences become replacement characters.
//!
//! HZ-GB-2312 (RFC 1843) is the one codec `encoding_rs` dropped along with
//! the WHATWG registry, so its `~{`/`~}` escape framing is implemented here
//! directly; the framed GB pairs themselves are looked up through the
//! GB18030 table (high bit restored, they are EUC-CN bytes).

use encoding_rs::{Encoding, BIG5, GB18030, GBK, UTF_8};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Clone, Copy, PartialEq)]
enum Codec {
    /// A WHATWG codec from `encoding_rs`.
    Standard(&'static Encoding),

    /// 7-bit escape-framed GB2312, RFC 1843.
    Hz,
}

/// A byte↔UTF-8 codec pair for one configured encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transcoder {
    codec: Codec,
}

impl Transcoder {
    /// Resolve an encoding name, case-insensitively.
    ///
    /// The GB2312 alias group names the escape-framed HZ codec; the plain
    /// GB/Big5 names resolve to their `encoding_rs` codecs. Unknown names
    /// resolve to identity.
    #[must_use]
    pub fn named(name: &str) -> Self {
        let codec = match name.trim().to_ascii_uppercase().as_str() {
            "GB2312" | "HZ-GB-2312" | "HZGB2312" | "EUC-CN" | "EUCCN" => Codec::Hz,
            "GBK" | "CP936" => Codec::Standard(GBK),
            "GB18030" => Codec::Standard(GB18030),
            "BIG5" | "BIG-5" | "BIG-FIVE" => Codec::Standard(BIG5),
            "UTF-8" | "UTF8" => Codec::Standard(UTF_8),
            other => {
                debug!(encoding = other, "unknown encoding name, using UTF-8");
                Codec::Standard(UTF_8)
            }
        };
        Self { codec }
    }

    #[must_use]
    pub fn is_identity(self) -> bool {
        self.codec == Codec::Standard(UTF_8)
    }

    /// Decode received bytes into UTF-8 text.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self.codec {
            Codec::Standard(encoding) => {
                let (text, _, _) = encoding.decode(bytes);
                text.into_owned()
            }
            Codec::Hz => hz_decode(bytes),
        }
    }

    /// Encode UTF-8 text into the wire encoding.
    #[must_use]
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self.codec {
            Codec::Standard(encoding) => {
                let (bytes, _, _) = encoding.encode(text);
                bytes.into_owned()
            }
            Codec::Hz => hz_encode(text),
        }
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self {
            codec: Codec::Standard(UTF_8),
        }
    }
}

/// Decode one HZ-GB-2312 run. `~{` enters GB mode, `~}` leaves it, `~~` is
/// a literal tilde, and `~` before a newline is the line continuation.
///
/// Stateless per call: a GB section never crosses the line boundary this is
/// applied at, which matches how the decoder has always been chained around
/// each received line.
fn hz_decode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut gb = false;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if gb {
            if byte == b'~' && bytes.get(i + 1) == Some(&b'}') {
                gb = false;
                i += 2;
            } else if let Some(&second) = bytes.get(i + 1) {
                out.push_str(&decode_gb_pair(byte, second));
                i += 2;
            } else {
                // Truncated pair at the end of the run.
                out.push(REPLACEMENT);
                i += 1;
            }
        } else if byte == b'~' {
            match bytes.get(i + 1) {
                Some(b'{') => {
                    gb = true;
                    i += 2;
                }
                Some(b'~') => {
                    out.push('~');
                    i += 2;
                }
                Some(b'\n') => i += 2,
                _ => {
                    out.push('~');
                    i += 1;
                }
            }
        } else if byte.is_ascii() {
            out.push(char::from(byte));
            i += 1;
        } else {
            out.push(REPLACEMENT);
            i += 1;
        }
    }
    out
}

/// Look one framed GB pair up via the GB18030 table. The 7-bit pair is the
/// EUC-CN form with the high bits stripped.
fn decode_gb_pair(first: u8, second: u8) -> String {
    if !(0x21..=0x7E).contains(&first) || !(0x21..=0x7E).contains(&second) {
        return REPLACEMENT.to_string();
    }
    let euc = [first | 0x80, second | 0x80];
    let (text, _, _) = GB18030.decode(&euc);
    text.into_owned()
}

fn hz_encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    let mut gb = false;

    for c in text.chars() {
        if c.is_ascii() {
            if gb {
                out.extend_from_slice(b"~}");
                gb = false;
            }
            match c {
                '~' => out.extend_from_slice(b"~~"),
                c => out.push(c as u8),
            }
            continue;
        }

        let mut buf = [0u8; 4];
        let (bytes, _, _) = GB18030.encode(c.encode_utf8(&mut buf));
        match bytes.as_ref() {
            [first, second]
                if (0xA1..=0xFE).contains(first) && (0xA1..=0xFE).contains(second) =>
            {
                if !gb {
                    out.extend_from_slice(b"~{");
                    gb = true;
                }
                out.push(*first & 0x7F);
                out.push(*second & 0x7F);
            }
            _ => {
                // Outside the repertoire HZ can frame.
                if gb {
                    out.extend_from_slice(b"~}");
                    gb = false;
                }
                out.push(b'?');
            }
        }
    }

    if gb {
        out.extend_from_slice(b"~}");
    }
    out
}

/// Encoding wrapper around the socket's write half.
///
/// Text lines are re-encoded before hitting the wire; raw protocol bytes
/// (IAC replies, heartbeats) pass through untouched.
#[derive(Debug)]
pub struct EncodingWriter<W> {
    inner: W,
    transcoder: Transcoder,
}

impl<W: AsyncWrite + Unpin> EncodingWriter<W> {
    pub fn new(inner: W, transcoder: Transcoder) -> Self {
        Self { inner, transcoder }
    }

    /// Write one command line, re-encoded, with a trailing LF.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut bytes = self.transcoder.encode(line);
        bytes.push(b'\n');
        self.inner.write_all(&bytes).await
    }

    /// Write protocol bytes verbatim.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn name_resolution_is_case_insensitive() {
        assert_eq!(Transcoder::named("gbk"), Transcoder::named("GBK"));
        assert_eq!(Transcoder::named("utf-8"), Transcoder::named("UTF8"));
        assert_eq!(Transcoder::named(" big5 "), Transcoder::named("BIG-FIVE"));
        assert_eq!(Transcoder::named("hz-gb-2312"), Transcoder::named("GB2312"));
    }

    #[test]
    fn gb2312_aliases_name_the_hz_codec() {
        let hz = Transcoder::named("HZ-GB-2312");
        for alias in ["GB2312", "HZGB2312", "EUC-CN", "EUCCN"] {
            assert_eq!(Transcoder::named(alias), hz);
        }
        // The escape-framed codec is its own target, distinct from the
        // plain GB18030 name.
        assert_ne!(hz, Transcoder::named("GB18030"));
    }

    #[test]
    fn unknown_names_are_identity() {
        assert!(Transcoder::named("KOI8-R").is_identity());
        assert!(Transcoder::named("").is_identity());
        assert!(!Transcoder::named("GB2312").is_identity());
    }

    #[test]
    fn identity_round_trip() {
        let t = Transcoder::named("UTF-8");
        assert_eq!(t.decode("你好 mud".as_bytes()), "你好 mud");
        assert_eq!(t.encode("你好 mud"), "你好 mud".as_bytes());
    }

    #[test]
    fn gbk_round_trip() {
        let t = Transcoder::named("GBK");
        let encoded = t.encode("北大侠客行");
        assert_ne!(encoded, "北大侠客行".as_bytes());
        assert_eq!(t.decode(&encoded), "北大侠客行");
    }

    #[test]
    fn hz_decodes_escape_framing() {
        let t = Transcoder::named("GB2312");
        // "你好" is C4E3 BAC3 in EUC-CN; stripped to 7 bits that is "Dc:C".
        assert_eq!(t.decode(b"~{Dc:C~} ok"), "你好 ok");
        assert_eq!(t.decode(b"no escapes"), "no escapes");
        assert_eq!(t.decode(b"a~~b"), "a~b");
    }

    #[test]
    fn hz_encodes_escape_framing() {
        let t = Transcoder::named("GB2312");
        assert_eq!(t.encode("你好 ok"), b"~{Dc:C~} ok");
        assert_eq!(t.encode("a~b"), b"a~~b");
    }

    #[test]
    fn hz_round_trip() {
        let t = Transcoder::named("EUC-CN");
        for text in ["你好", "say 你好 world", "plain", "北大侠客行"] {
            assert_eq!(t.decode(&t.encode(text)), text);
        }
    }

    #[test]
    fn hz_line_continuation_is_elided() {
        let t = Transcoder::named("GB2312");
        assert_eq!(t.decode(b"a~\nb"), "ab");
    }

    #[test]
    fn hz_malformed_input_degrades_to_replacement() {
        let t = Transcoder::named("GB2312");
        // Truncated GB pair.
        assert_eq!(t.decode(b"~{D"), "\u{FFFD}");
        // A high byte is not valid in a 7-bit stream.
        assert_eq!(t.decode(&[0xC4, b'a']), "\u{FFFD}a");
        // Stray trailing tilde.
        assert_eq!(t.decode(b"ab~"), "ab~");
    }

    #[test]
    fn hz_unframeable_chars_become_question_marks() {
        let t = Transcoder::named("GB2312");
        assert_eq!(t.encode("a🦀b"), b"a?b");
    }

    #[test]
    fn malformed_input_becomes_replacement() {
        let t = Transcoder::named("UTF-8");
        assert_eq!(t.decode(&[0xFF, b'a']), "\u{FFFD}a");
    }

    #[tokio::test]
    async fn writer_encodes_lines_and_passes_raw() {
        let mut buf = Vec::new();
        {
            let mut writer = EncodingWriter::new(&mut buf, Transcoder::named("GBK"));
            writer.write_line("好").await.unwrap();
            writer.write_raw(&[255, 253, 1]).await.unwrap();
        }
        let expected_line = Transcoder::named("GBK").encode("好");
        assert_eq!(buf[..expected_line.len()], expected_line[..]);
        assert_eq!(buf[expected_line.len()], b'\n');
        assert_eq!(buf[expected_line.len() + 1..], [255, 253, 1]);
    }
}
