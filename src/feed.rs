use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{debug, warn};

use crate::ingest::ResultSink;
use crate::record::SearchRecord;

/// Where the standalone binary reads result records from. Each line is
/// one JSON-encoded `SearchRecord`; this stands in for the network
/// search subsystem, which a real client wires in instead.
#[derive(Debug, Clone)]
pub enum FeedSource {
    Stdin,
    File(PathBuf),
}

pub struct FeedHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl FeedHandle {
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

pub fn spawn<S>(source: FeedSource, sink: S) -> Result<FeedHandle, io::Error>
where
    S: ResultSink + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    let join = thread::Builder::new()
        .name("hub-search-feed".into())
        .spawn(move || match source {
            FeedSource::Stdin => {
                let stdin = io::stdin();
                run_feed(stdin.lock(), &sink, &shutdown_clone);
            }
            FeedSource::File(path) => match File::open(&path) {
                Ok(file) => run_feed(BufReader::new(file), &sink, &shutdown_clone),
                Err(err) => warn!("feed open failed for {}: {err}", path.display()),
            },
        })?;

    Ok(FeedHandle {
        shutdown,
        join: Some(join),
    })
}

fn run_feed<R: BufRead, S: ResultSink>(reader: R, sink: &S, shutdown: &AtomicBool) {
    let mut records = 0u64;
    let mut bad_lines = 0u64;

    for line in reader.lines() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("feed read error: {err}");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<SearchRecord>(&line) {
            Ok(record) => {
                records += 1;
                sink.on_result(record);
            }
            Err(err) => {
                bad_lines += 1;
                warn!("feed parse error: {err}");
            }
        }
    }

    debug!("feed finished: {records} records, {bad_lines} bad lines");
}
