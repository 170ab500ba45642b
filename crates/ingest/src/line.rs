//! Line protocol
//!
//! One record per line: `<match-key>\t<payload>`. The key is UTF-8 and
//! non-empty; the payload is raw bytes up to the line terminator. Lines
//! without a tab, with an empty or non-UTF-8 key, or past the size bound
//! are rejected and counted, never fatal.

use shunt_delivery::Record;
use tokio::io::AsyncBufReadExt;

/// Outcome of one bounded line read
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineRead {
    /// A line is in the buffer; the count is bytes consumed off the wire
    Line(usize),
    /// Line exceeded the bound and was consumed and discarded
    TooLong,
    /// Clean end of stream
    Eof,
}

/// Read one newline-terminated line with bounded memory
///
/// The delimiter is consumed but not stored. When a line runs past
/// `max_size` the remainder is drained off the socket so the stream
/// stays aligned on line boundaries, and `TooLong` is reported.
pub(crate) async fn read_bounded_line<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max_size: usize,
) -> std::io::Result<LineRead> {
    line.clear();
    let mut consumed = 0usize;
    let mut overflowed = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if consumed == 0 {
                return Ok(LineRead::Eof);
            }
            // Stream ended mid-line; treat what we have as a line.
            break;
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if !overflowed {
                    if line.len() + pos > max_size {
                        overflowed = true;
                    } else {
                        line.extend_from_slice(&available[..pos]);
                    }
                }
                consumed += pos + 1;
                reader.consume(pos + 1);
                break;
            }
            None => {
                if !overflowed {
                    if line.len() + available.len() > max_size {
                        overflowed = true;
                    } else {
                        line.extend_from_slice(available);
                    }
                }
                let chunk = available.len();
                consumed += chunk;
                reader.consume(chunk);
            }
        }
    }

    if overflowed {
        line.clear();
        return Ok(LineRead::TooLong);
    }

    // Tolerate CRLF clients.
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(LineRead::Line(consumed))
}

/// Parse one line into a record
///
/// Returns `None` for lines the protocol rejects: no tab separator, an
/// empty key, or a key that is not UTF-8.
pub(crate) fn parse_record(line: &[u8]) -> Option<Record> {
    let tab = line.iter().position(|&b| b == b'\t')?;
    let key = std::str::from_utf8(&line[..tab]).ok()?;
    if key.is_empty() {
        return None;
    }
    Some(Record::new(key, line[tab + 1..].to_vec()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::BufReader;

    use super::*;

    async fn read_all(data: &[u8], max: usize) -> Vec<LineRead> {
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));
        let mut line = Vec::new();
        let mut reads = Vec::new();
        loop {
            let read = read_bounded_line(&mut reader, &mut line, max).await.unwrap();
            let done = read == LineRead::Eof;
            reads.push(read);
            if done {
                break;
            }
        }
        reads
    }

    #[tokio::test]
    async fn test_reads_lines_without_delimiters() {
        let mut reader = BufReader::new(Cursor::new(b"alpha\nbeta\r\n".to_vec()));
        let mut line = Vec::new();

        assert_eq!(
            read_bounded_line(&mut reader, &mut line, 64).await.unwrap(),
            LineRead::Line(6)
        );
        assert_eq!(line, b"alpha");

        assert_eq!(
            read_bounded_line(&mut reader, &mut line, 64).await.unwrap(),
            LineRead::Line(6)
        );
        assert_eq!(line, b"beta", "carriage return stripped");

        assert_eq!(
            read_bounded_line(&mut reader, &mut line, 64).await.unwrap(),
            LineRead::Eof
        );
    }

    #[tokio::test]
    async fn test_unterminated_tail_counts_as_a_line() {
        let reads = read_all(b"one\ntail", 64).await;
        assert_eq!(reads, [LineRead::Line(4), LineRead::Line(4), LineRead::Eof]);
    }

    #[tokio::test]
    async fn test_oversized_line_is_drained_and_rejected() {
        let mut data = vec![b'x'; 100];
        data.push(b'\n');
        data.extend_from_slice(b"ok\n");

        let reads = read_all(&data, 10).await;
        assert_eq!(reads, [LineRead::TooLong, LineRead::Line(3), LineRead::Eof]);
    }

    #[test]
    fn test_parse_record_splits_on_first_tab() {
        let record = parse_record(b"events\t{\"a\":\t1}").unwrap();
        assert_eq!(record.key, "events");
        assert_eq!(&record.payload[..], b"{\"a\":\t1}");
    }

    #[test]
    fn test_parse_record_allows_empty_payload() {
        let record = parse_record(b"events\t").unwrap();
        assert_eq!(record.key, "events");
        assert!(record.payload.is_empty());
    }

    #[test]
    fn test_parse_record_rejects_malformed_lines() {
        assert!(parse_record(b"no-tab-here").is_none());
        assert!(parse_record(b"\tpayload-without-key").is_none());
        assert!(parse_record(b"\xff\xfe\tbad-utf8-key").is_none());
    }
}
