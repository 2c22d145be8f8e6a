use std::cell::RefCell;
use std::io::Write;

use crate::error::Result;
use crate::records::EventRecord;

/// Writes records as newline-delimited JSON. Each record goes out in a
/// single write followed by a flush, so a reader tailing the stream never
/// sees half a line.
pub struct JsonLineWriter<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> JsonLineWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn emit(&self, record: impl Into<EventRecord>) -> Result<()> {
        // serde_json escapes control characters, so the line has no raw newline
        let record: EventRecord = record.into();
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut out = self.out.borrow_mut();
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationReason, EvaluationRequest, EvaluationResult};
    use crate::context::Context;
    use crate::records::build_summary_record;

    #[test]
    fn test_each_record_is_one_line() {
        let writer = JsonLineWriter::new(Vec::new());
        let request = EvaluationRequest::new(
            "demo-flag",
            Context::single("user", "line\nbreak").unwrap(),
            false,
        );
        let result = EvaluationResult::default_value(&request, EvaluationReason::off());

        writer
            .emit(build_summary_record(&request, &result, "multi\nline").unwrap())
            .unwrap();
        writer
            .emit(build_summary_record(&request, &result, "second").unwrap())
            .unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(output.ends_with('\n'));
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["event"], "evaluation_result_summary");
        }
    }
}
