//! Text encoding of commit records.
//!
//! Two record shapes share one file:
//!
//! ```text
//! <base58 hash>\t<escaped path>\n          legacy line
//!
//! -                                       extended record
//! p=<path>
//! h=<base58 hash>
//! I=<dev>:<ino>        (or u=<uuid>)
//! <blank line>
//! ```
//!
//! Legacy paths escape `\`, tab and newline. Extended values continue on the
//! next line when that line starts with a tab.

use std::io::BufRead;
use std::path::Path;

use super::entry::{CommitEntry, FileIdentity};
use crate::error::DocError;
use crate::hash::Multihash;

pub fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

pub fn decode_path(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Encode one record. Entries with an identity use the extended form.
pub fn encode_entry(entry: &CommitEntry) -> String {
    let Some(identity) = &entry.identity else {
        return format!("{}\t{}\n", entry.hash_text(), encode_path(&entry.path));
    };
    let mut out = String::from("-\n");
    push_field(&mut out, 'p', &entry.path);
    if let Some(hash) = &entry.hash {
        push_field(&mut out, 'h', &hash.to_base58());
    }
    match identity {
        FileIdentity::Uuid(uuid) => push_field(&mut out, 'u', uuid),
        FileIdentity::DevInode { .. } => push_field(&mut out, 'I', &identity.to_string()),
    }
    out.push('\n');
    out
}

fn push_field(out: &mut String, key: char, value: &str) {
    out.push(key);
    out.push('=');
    out.push_str(&value.replace('\n', "\n\t"));
    out.push('\n');
}

#[derive(Default)]
struct PendingRecord {
    start_line: usize,
    fields: Vec<(String, String)>,
}

impl PendingRecord {
    fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn finish(self, file: &Path) -> Result<CommitEntry, DocError> {
        let err = |reason: String| DocError::LogParse {
            path: file.to_path_buf(),
            line: self.start_line,
            reason,
        };
        let path = self
            .field("p")
            .ok_or_else(|| err("record without a path".to_string()))?
            .to_string();
        let hash = match self.field("h") {
            Some(text) if !text.is_empty() => {
                Some(text.parse::<Multihash>().map_err(|e| err(e.to_string()))?)
            }
            _ => None,
        };
        let identity = match (self.field("u"), self.field("I")) {
            (Some(uuid), _) if !uuid.is_empty() => Some(FileIdentity::Uuid(uuid.to_string())),
            (_, Some(devino)) => Some(devino.parse().map_err(|e: DocError| err(e.to_string()))?),
            _ => None,
        };
        Ok(CommitEntry {
            path,
            hash,
            identity,
        })
    }
}

/// Parse every record of a log, in file order.
pub fn parse_log(reader: impl BufRead, file: &Path) -> Result<Vec<CommitEntry>, DocError> {
    let mut entries = Vec::new();
    let mut pending: Option<PendingRecord> = None;

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line_no = idx + 1;
        let raw = line.map_err(|e| DocError::io_at(file, e))?;
        let line = String::from_utf8(raw).map_err(|_| DocError::LogParse {
            path: file.to_path_buf(),
            line: line_no,
            reason: "not valid UTF-8".to_string(),
        })?;

        if let Some(record) = pending.as_mut() {
            if line.is_empty() {
                if let Some(record) = pending.take() {
                    entries.push(record.finish(file)?);
                }
            } else if let Some(rest) = line.strip_prefix('\t') {
                if let Some((_, value)) = record.fields.last_mut() {
                    value.push('\n');
                    value.push_str(rest);
                }
            } else if let Some((key, value)) = line.split_once('=') {
                record.fields.push((key.to_string(), value.to_string()));
            } else {
                return Err(DocError::LogParse {
                    path: file.to_path_buf(),
                    line: line_no,
                    reason: format!("expected key=value, found '{}'", line),
                });
            }
            continue;
        }

        if line.is_empty() {
            continue;
        }
        if line == "-" {
            pending = Some(PendingRecord {
                start_line: line_no,
                fields: Vec::new(),
            });
            continue;
        }
        let Some((hash_text, path_text)) = line.split_once('\t') else {
            return Err(DocError::LogParse {
                path: file.to_path_buf(),
                line: line_no,
                reason: "missing tab separator".to_string(),
            });
        };
        let hash = if hash_text.is_empty() {
            None
        } else {
            Some(hash_text.parse::<Multihash>().map_err(|e| DocError::LogParse {
                path: file.to_path_buf(),
                line: line_no,
                reason: e.to_string(),
            })?)
        };
        entries.push(CommitEntry {
            path: decode_path(path_text),
            hash,
            identity: None,
        });
    }

    if let Some(record) = pending {
        entries.push(record.finish(file)?);
    }
    Ok(entries)
}
