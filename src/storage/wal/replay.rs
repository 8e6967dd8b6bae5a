use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::format::{parse_record, WalRecord};

/// Streaming reader over a WAL file, in file order.
///
/// File order equals commit order because appends serialize on the WAL
/// mutex. Malformed lines are logged and skipped so a torn final write
/// never aborts recovery.
pub struct WalReplay {
    lines: io::Lines<BufReader<File>>,
    line_number: u64,
}

impl WalReplay {
    /// Opens `path` for replay; `None` when no WAL exists yet.
    pub fn open(path: &Path) -> io::Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(Some(Self {
            lines: BufReader::new(file).lines(),
            line_number: 0,
        }))
    }
}

impl Iterator for WalReplay {
    type Item = WalRecord;

    fn next(&mut self) -> Option<WalRecord> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(?err, "stopping WAL replay on read error");
                    return None;
                }
            };
            self.line_number += 1;

            if line.is_empty() {
                continue;
            }

            match parse_record(&line) {
                Ok(record) => return Some(record),
                Err(err) => {
                    tracing::warn!(
                        line = self.line_number,
                        %err,
                        "skipping malformed WAL record"
                    );
                }
            }
        }
    }
}
