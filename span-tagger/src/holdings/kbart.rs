//! KBART holdings file parsing
//!
//! Tab separated, one serial per row. Files with a `publication_title`
//! header are mapped by column name; headerless files use the standard
//! KBART column positions. Rows with an unparseable date or embargo are
//! skipped with a warning, the rest of the file still counts.
//!
//! Holdings are often delivered as ZIP archives; every file member of an
//! archive is parsed into the same index.

use span_common::time::{Delay, DelayUnit, PartialDate};
use span_common::{Error, Result};
use std::io::{Cursor, Read};
use tracing::{debug, warn};

use super::{coerce_number, Bound, CoverageIndex, Entry};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const BOM: char = '\u{feff}';

/// Column positions of the fields we read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    title: Option<usize>,
    print_identifier: Option<usize>,
    online_identifier: Option<usize>,
    date_first: Option<usize>,
    volume_first: Option<usize>,
    issue_first: Option<usize>,
    date_last: Option<usize>,
    volume_last: Option<usize>,
    issue_last: Option<usize>,
    embargo: Option<usize>,
}

impl Default for Columns {
    /// KBART phase II column order
    fn default() -> Self {
        Self {
            title: Some(0),
            print_identifier: Some(1),
            online_identifier: Some(2),
            date_first: Some(3),
            volume_first: Some(4),
            issue_first: Some(5),
            date_last: Some(6),
            volume_last: Some(7),
            issue_last: Some(8),
            embargo: Some(12),
        }
    }
}

impl Columns {
    fn is_header(cells: &[&str]) -> bool {
        cells
            .first()
            .map(|c| c.trim().eq_ignore_ascii_case("publication_title"))
            .unwrap_or(false)
    }

    fn from_header(cells: &[&str]) -> Self {
        let find = |name: &str| cells.iter().position(|c| c.trim().eq_ignore_ascii_case(name));
        Self {
            title: find("publication_title"),
            print_identifier: find("print_identifier"),
            online_identifier: find("online_identifier"),
            date_first: find("date_first_issue_online"),
            volume_first: find("num_first_vol_online"),
            issue_first: find("num_first_issue_online"),
            date_last: find("date_last_issue_online"),
            volume_last: find("num_last_vol_online"),
            issue_last: find("num_last_issue_online"),
            embargo: find("embargo_info"),
        }
    }
}

fn cell<'a>(cells: &[&'a str], index: Option<usize>) -> &'a str {
    index
        .and_then(|i| cells.get(i))
        .map(|c| c.trim())
        .unwrap_or("")
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bound(date: &str, volume: &str, issue: &str) -> std::result::Result<Bound, String> {
    if date.is_empty() {
        return Ok(Bound::default());
    }
    let parsed = PartialDate::parse(date).ok_or_else(|| format!("invalid date {:?}", date))?;
    Ok(Bound {
        year: Some(parsed.year),
        volume: coerce_number(volume),
        issue: coerce_number(issue),
    })
}

/// Parse a KBART `embargo_info` value into `(from_delay, to_delay)`.
///
/// `P1Y` keeps the newest year out (from_delay `-1Y`), `R10Y` keeps only
/// the last ten years (to_delay `-10Y`). Both may be combined with `;`.
pub fn parse_embargo(
    raw: &str,
) -> std::result::Result<(Option<Delay>, Option<Delay>), String> {
    let mut from_delay = None;
    let mut to_delay = None;

    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let invalid = || format!("invalid embargo {:?}", raw);

        let mut chars = part.chars();
        let kind = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        let rest = chars.as_str();
        let unit = match rest.chars().last().map(|c| c.to_ascii_uppercase()) {
            Some('D') => DelayUnit::Day,
            Some('M') => DelayUnit::Month,
            Some('Y') => DelayUnit::Year,
            _ => return Err(invalid()),
        };
        let digits = &rest[..rest.len() - 1];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: i32 = digits.parse().map_err(|_| invalid())?;
        let delay = Some(Delay::new(-amount, unit));

        match kind {
            'P' => from_delay = delay,
            'R' => to_delay = delay,
            _ => return Err(invalid()),
        }
    }

    Ok((from_delay, to_delay))
}

fn parse_row(cells: &[&str], columns: &Columns) -> std::result::Result<Entry, String> {
    let from = parse_bound(
        cell(cells, columns.date_first),
        cell(cells, columns.volume_first),
        cell(cells, columns.issue_first),
    )?;
    let to = parse_bound(
        cell(cells, columns.date_last),
        cell(cells, columns.volume_last),
        cell(cells, columns.issue_last),
    )?;
    let (from_delay, to_delay) = parse_embargo(cell(cells, columns.embargo))?;

    Ok(Entry {
        title: cell(cells, columns.title).to_string(),
        print_identifier: non_empty(cell(cells, columns.print_identifier)),
        online_identifier: non_empty(cell(cells, columns.online_identifier)),
        from,
        to,
        from_delay,
        to_delay,
    })
}

/// Parse KBART text into `index`, returning the number of skipped rows.
pub fn parse_into(text: &str, reference: &str, index: &mut CoverageIndex) -> usize {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut columns = Columns::default();
    let mut skipped = 0;

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();

        if number == 0 && Columns::is_header(&cells) {
            columns = Columns::from_header(&cells);
            continue;
        }

        match parse_row(&cells, &columns) {
            Ok(entry) => {
                if !index.insert(entry) {
                    debug!(reference, line = number + 1, "Holdings row without ISSN");
                }
            }
            Err(reason) => {
                skipped += 1;
                warn!(reference, line = number + 1, "Skipping holdings row: {}", reason);
            }
        }
    }

    skipped
}

/// Parse one uncompressed holdings file.
pub fn parse_bytes(bytes: &[u8], reference: &str) -> CoverageIndex {
    let mut index = CoverageIndex::new();
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            parse_into(text, reference, &mut index);
        }
        Err(e) => {
            warn!(reference, "Holdings file is not valid UTF-8 ({}), decoding lossily", e);
            parse_into(&String::from_utf8_lossy(bytes), reference, &mut index);
        }
    }
    index
}

/// Parse holdings bytes, unpacking ZIP archives.
///
/// Bytes that look like a ZIP archive but cannot be opened or read are an
/// [`Error::Archive`]; anything else is parsed as plain KBART text.
pub fn read_holdings(bytes: &[u8], reference: &str) -> Result<CoverageIndex> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Ok(parse_bytes(bytes, reference));
    }

    let archive_error = |message: String| Error::Archive {
        reference: reference.to_string(),
        message,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| archive_error(e.to_string()))?;

    let mut index = CoverageIndex::new();
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(|e| archive_error(e.to_string()))?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        let mut content = Vec::new();
        member
            .read_to_end(&mut content)
            .map_err(|e| archive_error(format!("{}: {}", name, e)))?;

        debug!(reference, member = %name, bytes = content.len(), "Parsing archive member");
        index.extend(parse_bytes(&content, &format!("{}:{}", reference, name)));
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const HEADER: &str = "publication_title\tprint_identifier\tonline_identifier\tdate_first_issue_online\tnum_first_vol_online\tnum_first_issue_online\tdate_last_issue_online\tnum_last_vol_online\tnum_last_issue_online\ttitle_url\tfirst_author\ttitle_id\tembargo_info\tcoverage_depth";

    #[test]
    fn test_parse_with_header() {
        let text = format!(
            "{}\nJournal A\t1234-5678\t8765-4321\t2000-01-01\t1\t1\t2010-12-31\t11\t4\thttp://a\t\tA\t\tfulltext\n",
            HEADER
        );
        let index = parse_bytes(text.as_bytes(), "a.tsv");

        assert_eq!(index.row_count(), 1);
        let entries = index.get("1234-5678");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Journal A");
        assert_eq!(entries[0].from, Bound::year(2000).with_volume(1).with_issue(1));
        assert_eq!(entries[0].to, Bound::year(2010).with_volume(11).with_issue(4));
        assert_eq!(index.get("8765-4321").len(), 1);
    }

    #[test]
    fn test_parse_header_in_different_order() {
        let text = "publication_title\tembargo_info\tonline_identifier\tdate_first_issue_online\n\
                    Journal B\tP1Y\t1111-2222\t1995\n";
        let index = parse_bytes(text.as_bytes(), "b.tsv");

        let entries = index.get("1111-2222");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].from, Bound::year(1995));
        assert_eq!(entries[0].to, Bound::default());
        assert_eq!(entries[0].from_delay, Some(Delay::new(-1, DelayUnit::Year)));
    }

    #[test]
    fn test_parse_headerless_uses_standard_positions() {
        let text = "Journal C\t2222-3333\t\t2001\t\t\t\t\t\t\t\t\tR5Y\n";
        let index = parse_bytes(text.as_bytes(), "c.tsv");

        let entries = index.get("2222-3333");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].from, Bound::year(2001));
        assert_eq!(entries[0].to_delay, Some(Delay::new(-5, DelayUnit::Year)));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = format!(
            "{}\nBad Date\t1234-5678\t\tsometime\n\
             Bad Embargo\t2345-6789\t\t2000\t\t\t\t\t\t\t\t\tX1Y\n\
             Good\t3456-7890\t\t2000\n",
            HEADER
        );
        let mut index = CoverageIndex::new();
        let skipped = parse_into(&text, "d.tsv", &mut index);

        assert_eq!(skipped, 2);
        assert_eq!(index.row_count(), 1);
        assert_eq!(index.get("3456-7890").len(), 1);
    }

    #[test]
    fn test_bom_and_crlf() {
        let text = format!("\u{feff}{}\r\nJournal D\t1234-5678\t\t2000\r\n", HEADER);
        let index = parse_bytes(text.as_bytes(), "e.tsv");
        assert_eq!(index.get("1234-5678").len(), 1);
        assert_eq!(index.get("1234-5678")[0].from, Bound::year(2000));
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let mut bytes = b"Journal \xff\t1234-5678\t\t2000\n".to_vec();
        bytes.extend_from_slice(b"Journal E\t2345-6789\t\t2001\n");
        let index = parse_bytes(&bytes, "f.tsv");
        assert_eq!(index.row_count(), 2);
    }

    #[test]
    fn test_empty_input() {
        let index = read_holdings(b"", "empty.tsv").unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_parse_embargo() {
        assert_eq!(parse_embargo("").unwrap(), (None, None));
        assert_eq!(
            parse_embargo("P6M").unwrap(),
            (Some(Delay::new(-6, DelayUnit::Month)), None)
        );
        assert_eq!(
            parse_embargo("R10Y;P30D").unwrap(),
            (
                Some(Delay::new(-30, DelayUnit::Day)),
                Some(Delay::new(-10, DelayUnit::Year))
            )
        );
        assert!(parse_embargo("P").is_err());
        assert!(parse_embargo("Q1Y").is_err());
        assert!(parse_embargo("P1W").is_err());
        assert!(parse_embargo("Pxy").is_err());
    }

    #[test]
    fn test_signed_embargo_amount_is_rejected() {
        assert!(parse_embargo("P-1Y").is_err());
        assert!(parse_embargo("R+5Y").is_err());
        assert!(parse_embargo("P6M;R-1Y").is_err());
    }

    #[test]
    fn test_zip_archive_members_are_merged() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            writer.start_file("first.tsv", options).unwrap();
            writer
                .write_all(format!("{}\nA\t1234-5678\t\t2000\n", HEADER).as_bytes())
                .unwrap();
            writer.start_file("second.tsv", options).unwrap();
            writer.write_all(b"B\t2345-6789\t\t2001\n").unwrap();
            writer.finish().unwrap();
        }

        let index = read_holdings(buf.get_ref(), "holdings.zip").unwrap();
        assert_eq!(index.row_count(), 2);
        assert_eq!(index.get("1234-5678").len(), 1);
        assert_eq!(index.get("2345-6789").len(), 1);
    }

    #[test]
    fn test_corrupt_zip_is_an_archive_error() {
        let bytes = b"PK\x03\x04this is not really an archive";
        let result = read_holdings(bytes, "broken.zip");
        assert!(matches!(result, Err(Error::Archive { .. })));
    }
}
