use std::io::{BufRead, Write};

use tracing::warn;

use crate::error::Result;
use crate::model::QaPair;

/// Pairs read from a JSON-lines file and the number of lines dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JsonlBatch {
    pub pairs: Vec<QaPair>,
    pub skipped: usize,
}

/// One `{id, question, answer}` object per line.
pub fn write_pairs_jsonl<W: Write>(mut writer: W, pairs: &[QaPair]) -> Result<()> {
    for pair in pairs {
        serde_json::to_writer(&mut writer, pair)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Blank lines are ignored. A line that is not a pair object, or whose
/// question or answer is empty, is skipped and logged with its line number;
/// only a read failure aborts.
pub fn read_pairs_jsonl<R: BufRead>(reader: R) -> Result<JsonlBatch> {
    let mut batch = JsonlBatch::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<QaPair>(&line) {
            Ok(pair) if pair.is_usable() => batch.pairs.push(pair),
            Ok(_) => {
                warn!(line = idx + 1, "skipping pair with empty question or answer");
                batch.skipped += 1;
            }
            Err(err) => {
                warn!(line = idx + 1, error = %err, "skipping malformed jsonl line");
                batch.skipped += 1;
            }
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_lines_read_back() {
        let pairs = vec![
            QaPair {
                id: 1,
                question: "What are your hours?".into(),
                answer: "9 to 5".into(),
            },
            QaPair {
                id: 2,
                question: "Rules?".into(),
                answer: "Be kind\\nNo spam".into(),
            },
        ];
        let mut buf = Vec::new();
        write_pairs_jsonl(&mut buf, &pairs).unwrap();
        assert_eq!(String::from_utf8_lossy(&buf).lines().count(), 2);

        let batch = read_pairs_jsonl(buf.as_slice()).unwrap();
        assert_eq!(batch.pairs, pairs);
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn bad_lines_are_skipped_not_fatal() {
        let raw = "{\"question\":\"q\",\"answer\":\"a\"}\n\nnope\n[1,2]\n{\"question\":\"only\"}\n";
        let batch = read_pairs_jsonl(raw.as_bytes()).unwrap();
        assert_eq!(batch.pairs.len(), 1);
        assert_eq!(batch.pairs[0].id, 0);
        assert_eq!(batch.skipped, 3);
    }
}
