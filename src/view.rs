//! Turns fetched records into what the template shows: row numbers counted from
//! the skip offset and a date separator after every gap longer than five minutes.

use crate::store::MessageRecord;
use chrono::{DateTime, Local, TimeDelta};

/// Gap after which the next message gets a date separator.
pub const SEPARATOR_GAP: TimeDelta = TimeDelta::minutes(5);

/// A message plus the presentation fields the template needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRecord {
    pub row_number: usize,
    pub show_date_separator: bool,
    /// Relative path of the copied attachment, set only after a successful copy.
    pub attachment_output_path: Option<String>,
    pub record: MessageRecord,
}

impl ViewRecord {
    pub fn is_from_me(&self) -> bool {
        self.record.is_from_me
    }

    pub fn text(&self) -> &str {
        self.record.text.as_deref().unwrap_or_default()
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.record.timestamp
    }
}

/// Number the records from `skip_offset` and mark where date separators go.
///
/// Gaps are measured against the immediately preceding record, whatever it is.
pub fn build<I>(records: I, skip_offset: usize) -> Vec<ViewRecord>
where
    I: IntoIterator<Item = MessageRecord>,
{
    let mut last: Option<DateTime<Local>> = None;

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let show_date_separator = match last {
                None => true,
                Some(prev) => record.timestamp - prev > SEPARATOR_GAP,
            };
            last = Some(record.timestamp);

            ViewRecord {
                row_number: skip_offset + i,
                show_date_separator,
                attachment_output_path: None,
                record,
            }
        })
        .collect()
}

/// Assign copied attachment paths to their view records, slot for slot.
pub fn attach_outputs(views: &mut [ViewRecord], outputs: Vec<Option<String>>) {
    for (view, output) in views.iter_mut().zip(outputs) {
        view.attachment_output_path = output;
    }
}
