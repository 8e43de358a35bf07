//! Copies message attachments into the export folder.
//!
//! Each file lands in `<output>/attachments/<uuid>.<ext>` and the record is given
//! the relative path `attachments/<uuid>.<ext>` to reference from the HTML. A
//! failed copy is logged and leaves the record without an output path; it never
//! stops the export.

use crate::error::AttachmentError;
use crate::store::MessageRecord;
use crossbeam_channel::{bounded, unbounded};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Subdirectory of the output root that receives copied attachments.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Copy workers allowed per available CPU, whatever `jobs` asks for.
const WORKERS_PER_CPU: usize = 4;

/// Expand a leading `~` to the current user's home directory.
pub fn resolve_home(path: &str) -> PathBuf {
    expand_home(path, dirs::home_dir().as_deref())
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        // `~user/...` is left alone.
        _ => return PathBuf::from(path),
    };
    match home {
        Some(home) if rest.is_empty() => home.to_path_buf(),
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Stream `source` into the attachments folder under a fresh unique name.
/// Returns the path relative to `output_root`.
pub fn copy_attachment(source: &Path, output_root: &Path) -> Result<String, AttachmentError> {
    let token = Uuid::new_v4();
    let name = match source.extension() {
        Some(ext) => format!("{}.{}", token, ext.to_string_lossy()),
        None => token.to_string(),
    };
    let dest = output_root.join(ATTACHMENTS_DIR).join(&name);

    stream_copy(source, &dest).map_err(|source_err| AttachmentError::Copy {
        from: source.to_path_buf(),
        to: dest.clone(),
        source: source_err,
    })?;
    debug!(from = %source.display(), to = %dest.display(), "copied attachment");

    Ok(format!("{}/{}", ATTACHMENTS_DIR, name))
}

fn stream_copy(from: &Path, to: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(from)?);
    let mut writer = BufWriter::new(File::create(to)?);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}

/// Worker count for `pending` copies: never more than the copies themselves, nor
/// more than `WORKERS_PER_CPU` per available CPU.
fn pool_size(jobs: usize, pending: usize) -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    jobs.min(cpus * WORKERS_PER_CPU).min(pending).max(1)
}

fn copy_record(record: &MessageRecord, output_root: &Path) -> Result<String, AttachmentError> {
    let source = record
        .attachment_source_path
        .as_deref()
        .ok_or(AttachmentError::MissingSource { id: record.id })?;
    copy_attachment(&resolve_home(source), output_root)
}

/// Copy the attachment of every record that has one, using at most `jobs`
/// concurrent copies.
///
/// The result has one slot per input record, in input order: `Some(path)` for a
/// successful copy, `None` for records without an attachment or whose copy
/// failed.
pub fn materialize(records: &[MessageRecord], output_root: &Path, jobs: usize) -> Vec<Option<String>> {
    let pending: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.has_attachment)
        .map(|(idx, _)| idx)
        .collect();

    let workers = pool_size(jobs, pending.len());
    let mut results: Vec<Option<Result<String, AttachmentError>>> =
        std::iter::repeat_with(|| None).take(records.len()).collect();

    if workers == 1 {
        for idx in pending {
            results[idx] = Some(copy_record(&records[idx], output_root));
        }
    } else {
        let (job_tx, job_rx) = bounded::<usize>(workers * 2);
        let (done_tx, done_rx) = unbounded::<(usize, Result<String, AttachmentError>)>();

        std::thread::scope(|s| {
            for _ in 0..workers {
                let (job_rx, done_tx) = (job_rx.clone(), done_tx.clone());
                s.spawn(move || {
                    while let Ok(idx) = job_rx.recv() {
                        let outcome = copy_record(&records[idx], output_root);
                        if done_tx.send((idx, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            for idx in pending {
                if job_tx.send(idx).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        for (idx, outcome) in done_rx.iter() {
            results[idx] = Some(outcome);
        }
    }

    results
        .into_iter()
        .map(|slot| match slot? {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn output_root() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(ATTACHMENTS_DIR)).unwrap();
        dir
    }

    fn record(id: i64, source: Option<&str>) -> MessageRecord {
        MessageRecord {
            id,
            is_from_me: false,
            text: Some(format!("message {}", id)),
            timestamp: Local.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
            has_attachment: true,
            attachment_source_path: source.map(str::to_string),
        }
    }

    #[test]
    fn expands_home_shorthand() {
        let home = Path::new("/Users/someone");
        assert_eq!(
            expand_home("~/Library/Messages/Attachments/a.png", Some(home)),
            PathBuf::from("/Users/someone/Library/Messages/Attachments/a.png")
        );
        assert_eq!(expand_home("~", Some(home)), PathBuf::from("/Users/someone"));
    }

    #[test]
    fn leaves_other_paths_alone() {
        let home = Path::new("/Users/someone");
        assert_eq!(expand_home("/tmp/a.png", Some(home)), PathBuf::from("/tmp/a.png"));
        assert_eq!(expand_home("~other/a.png", Some(home)), PathBuf::from("~other/a.png"));
        assert_eq!(expand_home("~/a.png", None), PathBuf::from("~/a.png"));
    }

    #[test]
    fn copy_preserves_bytes_and_extension_case() {
        let src_dir = tempdir().unwrap();
        let src = src_dir.path().join("IMG_0001.JPG");
        fs::write(&src, b"\xff\xd8\xff image bytes").unwrap();
        let out = output_root();

        let rel = copy_attachment(&src, out.path()).unwrap();
        assert!(rel.starts_with("attachments/"));
        assert!(rel.ends_with(".JPG"));
        assert_eq!(fs::read(out.path().join(&rel)).unwrap(), b"\xff\xd8\xff image bytes");
    }

    #[test]
    fn copy_without_extension_uses_bare_token() {
        let src_dir = tempdir().unwrap();
        let src = src_dir.path().join("README");
        fs::write(&src, "x").unwrap();
        let out = output_root();

        let rel = copy_attachment(&src, out.path()).unwrap();
        let name = rel.strip_prefix("attachments/").unwrap();
        assert!(Uuid::parse_str(name).is_ok());
    }

    #[test]
    fn generated_names_are_unique() {
        let src_dir = tempdir().unwrap();
        let src = src_dir.path().join("a.png");
        fs::write(&src, "x").unwrap();
        let out = output_root();

        let first = copy_attachment(&src, out.path()).unwrap();
        let second = copy_attachment(&src, out.path()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn failures_do_not_stop_other_copies() {
        let src_dir = tempdir().unwrap();
        let good = src_dir.path().join("good.gif");
        fs::write(&good, "gif").unwrap();
        let good = good.to_string_lossy().to_string();
        let out = output_root();

        let mut records = vec![
            record(1, Some("/definitely/not/here.png")),
            record(2, Some(&good)),
            record(3, None),
            record(4, Some(&good)),
        ];
        records.push(MessageRecord {
            has_attachment: false,
            ..record(5, None)
        });

        for jobs in [1, 3] {
            let outputs = materialize(&records, out.path(), jobs);
            assert_eq!(outputs.len(), 5);
            assert!(outputs[0].is_none());
            assert!(outputs[1].as_deref().is_some_and(|p| p.ends_with(".gif")));
            assert!(outputs[2].is_none());
            assert!(outputs[3].is_some());
            assert!(outputs[4].is_none());
        }
    }

    #[test]
    fn pool_size_stays_bounded() {
        let ceiling = std::thread::available_parallelism().map_or(1, |n| n.get()) * WORKERS_PER_CPU;
        assert_eq!(pool_size(100_000, 100_000), ceiling);
        assert_eq!(pool_size(3, 2), 2);
        assert_eq!(pool_size(0, 5), 1);
        assert_eq!(pool_size(4, 0), 1);
    }

    #[test]
    fn parallel_copy_keeps_slots_aligned() {
        let src_dir = tempdir().unwrap();
        let out = output_root();
        let records: Vec<MessageRecord> = (0..20)
            .map(|i| {
                let src = src_dir.path().join(format!("{}.txt", i));
                fs::write(&src, i.to_string()).unwrap();
                record(i, Some(&src.to_string_lossy()))
            })
            .collect();

        let outputs = materialize(&records, out.path(), 4);
        for (i, path) in outputs.iter().enumerate() {
            let path = path.as_deref().unwrap();
            assert_eq!(fs::read_to_string(out.path().join(path)).unwrap(), i.to_string());
        }
    }
}
