//! Streaming reader for files of concatenated JSON objects
//!
//! Input files hold zero or more JSON objects separated by arbitrary whitespace, with objects
//! free to span several lines or share one line (`{"a":1}{"b":2}`). The file is read one line at
//! a time and fed through an [`ObjectFramer`], which tracks nesting depth and string/escape state
//! so that an object is cut exactly where its outermost brace closes. Closing braces inside
//! string values or nested objects never end a record early.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

/// A JSON object read from the input file, with no schema applied
pub type RawRecord = Map<String, Value>;

/// Errors that abort reading a record file
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON object starting on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected {found:?} on line {line}: expected the start of a JSON object")]
    UnexpectedContent { line: usize, found: char },

    #[error("JSON object starting on line {line} is never closed")]
    Unterminated { line: usize },
}

impl ReaderError {
    /// Line the error points at (0 for open failures)
    pub fn line(&self) -> usize {
        match self {
            ReaderError::Open { .. } => 0,
            ReaderError::Io { line, .. }
            | ReaderError::Malformed { line, .. }
            | ReaderError::UnexpectedContent { line, .. }
            | ReaderError::Unterminated { line } => *line,
        }
    }
}

/// Text of one complete top-level object and the line it started on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub text: String,
    pub line: usize,
}

/// Incremental splitter for a stream of concatenated JSON objects
///
/// Only structure is tracked here; validating the object body is left to `serde_json`.
/// `[`/`]` count towards depth like braces, so a mismatched pair still closes the frame and is
/// reported by the parser.
#[derive(Debug, Default)]
pub struct ObjectFramer {
    buffer: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
    start_line: usize,
}

impl ObjectFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of text, appending every object it completes to `out`
    pub fn push(
        &mut self,
        text: &str,
        line: usize,
        out: &mut VecDeque<Frame>,
    ) -> Result<(), ReaderError> {
        for ch in text.chars() {
            if self.depth == 0 {
                match ch {
                    c if c.is_whitespace() => continue,
                    '\u{feff}' => continue,
                    '{' => {
                        self.depth = 1;
                        self.start_line = line;
                        self.buffer.push(ch);
                    },
                    found => return Err(ReaderError::UnexpectedContent { line, found }),
                }
                continue;
            }

            self.buffer.push(ch);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' | '[' => self.depth += 1,
                '}' | ']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        out.push_back(Frame {
                            text: std::mem::take(&mut self.buffer),
                            line: self.start_line,
                        });
                    }
                },
                _ => {},
            }
        }

        Ok(())
    }

    /// Signal end of input; fails if an object is still open
    pub fn finish(&self) -> Result<(), ReaderError> {
        if self.depth > 0 {
            return Err(ReaderError::Unterminated {
                line: self.start_line,
            });
        }
        Ok(())
    }
}

/// Lazy sequence of records read from a file
///
/// Records are yielded in file order. The first error is yielded once, after every record that
/// precedes it in the file, and the stream ends there.
pub struct RecordStream<R> {
    reader: R,
    framer: ObjectFramer,
    line: String,
    line_number: usize,
    pending: VecDeque<Frame>,
    failure: Option<ReaderError>,
    finished: bool,
}

impl RecordStream<BufReader<File>> {
    /// Open a record file for streaming
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: ObjectFramer::new(),
            line: String::new(),
            line_number: 0,
            pending: VecDeque::new(),
            failure: None,
            finished: false,
        }
    }

    fn fail(&mut self, error: ReaderError) -> Option<Result<RawRecord, ReaderError>> {
        self.finished = true;
        self.pending.clear();
        self.failure = None;
        Some(Err(error))
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<RawRecord, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return match serde_json::from_str::<RawRecord>(&frame.text) {
                    Ok(record) => Some(Ok(record)),
                    Err(source) => self.fail(ReaderError::Malformed {
                        line: frame.line,
                        source,
                    }),
                };
            }

            if let Some(error) = self.failure.take() {
                return self.fail(error);
            }

            if self.finished {
                return None;
            }

            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.finished = true;
                    if let Err(error) = self.framer.finish() {
                        return self.fail(error);
                    }
                },
                Ok(_) => {
                    self.line_number += 1;
                    if let Err(error) =
                        self.framer
                            .push(&self.line, self.line_number, &mut self.pending)
                    {
                        // Objects completed earlier on this line still go out first.
                        self.failure = Some(error);
                    }
                },
                Err(source) => {
                    return self.fail(ReaderError::Io {
                        line: self.line_number + 1,
                        source,
                    })
                },
            }
        }
    }
}

impl<R: BufRead> FusedIterator for RecordStream<R> {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn read_all(input: &str) -> Vec<Result<RawRecord, ReaderError>> {
        RecordStream::new(Cursor::new(input.to_string())).collect()
    }

    fn records(input: &str) -> Vec<Value> {
        read_all(input)
            .into_iter()
            .map(|r| Value::Object(r.unwrap()))
            .collect()
    }

    #[test]
    fn test_objects_on_one_line() {
        assert_eq!(records(r#"{"a":1}{"b":2}"#), vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_object_spanning_lines() {
        let input = "{\n  \"a\": 1,\n  \"b\": [1, 2]\n}\n\n{\"c\": 3}\n";
        assert_eq!(
            records(input),
            vec![json!({"a": 1, "b": [1, 2]}), json!({"c": 3})]
        );
    }

    #[test]
    fn test_nested_object_closing_at_line_end() {
        // A line ending in `}` is not necessarily the end of a record.
        let input = "{\"meta\": {\"id\": \"P1\"}\n, \"price\": \"1.00\"}\n";
        assert_eq!(
            records(input),
            vec![json!({"meta": {"id": "P1"}, "price": "1.00"})]
        );
    }

    #[test]
    fn test_braces_and_escaped_quotes_inside_strings() {
        let input = r#"{"s": "}{ \"}\" {"}{"t": "\\"}"#;
        assert_eq!(
            records(input),
            vec![json!({"s": "}{ \"}\" {"}), json!({"t": "\\"})]
        );
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(read_all("").is_empty());
        assert!(read_all("  \n\t\n").is_empty());
    }

    #[test]
    fn test_unterminated_object_is_an_error_after_complete_records() {
        let results = read_all("{\"a\":1}\n{\"b\":\n2\n");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ReaderError::Unterminated { line: 2 })));
    }

    #[test]
    fn test_malformed_object_stops_the_stream() {
        let results = read_all("{\"a\":1}\n{\"b\":}\n{\"c\":3}\n");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(err @ ReaderError::Malformed { .. }) => assert_eq!(err.line(), 2),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_top_level_non_object_is_rejected() {
        let results = read_all("[1, 2]\n");
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(ReaderError::UnexpectedContent { line: 1, found: '[' })
        ));
    }

    #[test]
    fn test_trailing_garbage_after_object_on_same_line() {
        let results = read_all("{\"a\":1} oops\n");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(ReaderError::UnexpectedContent { found: 'o', .. })
        ));
    }

    #[test]
    fn test_stream_is_fused_after_error() {
        let mut stream = RecordStream::new(Cursor::new("x{\"a\":1}".to_string()));
        assert!(matches!(stream.next(), Some(Err(_))));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let result = RecordStream::open("/nonexistent/dataweave/records.json");
        assert!(matches!(result, Err(ReaderError::Open { .. })));
    }

    #[test]
    fn test_framer_reports_start_line() {
        let mut framer = ObjectFramer::new();
        let mut out = VecDeque::new();
        framer.push("\n", 1, &mut out).unwrap();
        framer.push("{\"a\":\n", 2, &mut out).unwrap();
        framer.push("1}\n", 3, &mut out).unwrap();
        framer.finish().unwrap();

        assert_eq!(
            out.pop_front(),
            Some(Frame {
                text: "{\"a\":\n1}".to_string(),
                line: 2
            })
        );
    }
}
