//! External OCR engine invoked as a bounded subprocess.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use chrono::Utc;
use image::DynamicImage;
use tracing::{debug, warn};

use crate::confidence::Confidence;
use crate::config::EngineCommandConfig;

use super::{attempt_record, AttemptBudget, AttemptOutcome, EngineId, RecognitionAttempt, RecognitionEngine, Token};

/// Poll interval for the supervision loop.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for the stdout drain after the process is gone.
const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// A recognition engine backed by an external OCR process.
///
/// The prepared image is handed over as a temp PNG path; the process
/// prints one token per line on stdout as tab-separated
/// `text  x  y  width  height  confidence`. The supervision loop
/// enforces the wall-clock budget and the memory ceiling by polling,
/// and whatever stdout the process managed to produce before a kill
/// is still parsed as partial tokens.
pub struct CommandEngine {
    id: EngineId,
    command: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(id: EngineId, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Build from a configuration entry.
    pub fn from_config(config: &EngineCommandConfig) -> Self {
        Self {
            id: config.id,
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    /// Extra arguments placed before the image path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn supervise(&self, child: &mut Child, budget: &AttemptBudget) -> (AttemptOutcome, Option<u64>) {
        let deadline = Instant::now() + budget.wall;
        let pid = child.id();
        let mut peak_mb: Option<u64> = None;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let outcome = if status.success() {
                        AttemptOutcome::Success
                    } else {
                        AttemptOutcome::Error(format!("engine exited with {}", status))
                    };
                    return (outcome, peak_mb);
                }
                Ok(None) => {}
                Err(e) => {
                    return (AttemptOutcome::Error(format!("wait failed: {}", e)), peak_mb);
                }
            }

            if let Some(rss) = read_rss_mb(pid) {
                peak_mb = Some(peak_mb.map_or(rss, |p| p.max(rss)));
                if let Some(ceiling) = budget.memory_mb {
                    if rss > ceiling {
                        warn!(engine = %self.id, rss_mb = rss, ceiling_mb = ceiling, "memory ceiling exceeded, killing engine");
                        kill_engine(child);
                        return (AttemptOutcome::ResourceExceeded, peak_mb);
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(engine = %self.id, budget_ms = budget.wall.as_millis() as u64, "wall-clock budget exceeded, killing engine");
                kill_engine(child);
                return (AttemptOutcome::Timeout, peak_mb);
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl RecognitionEngine for CommandEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn recognize(&self, image: &DynamicImage, budget: &AttemptBudget) -> RecognitionAttempt {
        let started_at = Utc::now();

        let tmp = match tempfile::Builder::new()
            .prefix("fakturo-")
            .suffix(".png")
            .tempfile()
        {
            Ok(t) => t,
            Err(e) => {
                return attempt_record(
                    self.id,
                    started_at,
                    AttemptOutcome::Error(format!("temp file: {}", e)),
                    Vec::new(),
                    None,
                );
            }
        };

        if let Err(e) = image.save_with_format(tmp.path(), image::ImageFormat::Png) {
            return attempt_record(
                self.id,
                started_at,
                AttemptOutcome::Error(format!("image handoff: {}", e)),
                Vec::new(),
                None,
            );
        }

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(tmp.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        // Own process group, so a kill reaches any children the engine
        // forked, not just the engine itself.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                return attempt_record(
                    self.id,
                    started_at,
                    AttemptOutcome::Error(format!("spawn {}: {}", self.command, e)),
                    Vec::new(),
                    None,
                );
            }
        };

        // Drain stdout off-thread. A surviving grandchild could keep
        // the write end of the pipe open past the kill, and a blocking
        // read here would stall the whole attempt on it.
        let stdout_rx = child.stdout.take().map(|mut pipe| {
            let (tx, rx) = mpsc::channel();
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                let _ = tx.send(buf);
            });
            rx
        });

        let (outcome, peak_mb) = self.supervise(&mut child, budget);

        // Partial results on timeout: parse whatever stdout exists.
        let stdout = stdout_rx
            .and_then(|rx| rx.recv_timeout(STDOUT_DRAIN_TIMEOUT).ok())
            .unwrap_or_default();
        let tokens = parse_tokens(&stdout);

        debug!(
            engine = %self.id,
            outcome = ?outcome,
            tokens = tokens.len(),
            "engine attempt finished"
        );

        attempt_record(self.id, started_at, outcome, tokens, peak_mb)
    }
}

/// Parse the TSV token protocol; malformed lines are skipped.
fn parse_tokens(stdout: &str) -> Vec<Token> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let text = parts.next()?.trim();
            if text.is_empty() {
                return None;
            }
            let x: f32 = parts.next()?.trim().parse().ok()?;
            let y: f32 = parts.next()?.trim().parse().ok()?;
            let w: f32 = parts.next()?.trim().parse().ok()?;
            let h: f32 = parts.next()?.trim().parse().ok()?;
            let conf: f32 = parts.next()?.trim().parse().ok()?;
            Some(Token::new(text, [x, y, w, h], Confidence::new(conf)))
        })
        .collect()
}

/// Kill the engine and everything it spawned. The child was made its
/// own process group leader, so signalling the group reaches forked
/// grandchildren too.
fn kill_engine(child: &mut Child) {
    #[cfg(unix)]
    unsafe {
        libc::kill(-(child.id() as i32), libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Resident set size of a process in MB, via procfs.
#[cfg(target_os = "linux")]
fn read_rss_mb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024)
}

#[cfg(not(target_os = "linux"))]
fn read_rss_mb(_pid: u32) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        let out = "NIP: 5260001246\t10\t20\t120\t18\t0.97\nbroken line\n23%\t10\t40\t40\t18\t0.9\n";
        let tokens = parse_tokens(out);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "NIP: 5260001246");
        assert_eq!(tokens[1].bbox, [10.0, 40.0, 40.0, 18.0]);
    }

    #[test]
    fn test_spawn_failure_becomes_error_outcome() {
        let engine = CommandEngine::new(EngineId::Primary, "/nonexistent/ocr-binary");
        let image = DynamicImage::new_luma8(8, 8);
        let budget = AttemptBudget::new(Duration::from_millis(200));

        let attempt = engine.recognize(&image, &budget);
        assert!(matches!(attempt.outcome, AttemptOutcome::Error(_)));
        assert!(attempt.tokens.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_process() {
        // The image path lands in $0 of the -c script and is ignored.
        // The shell forks sleep as its own child, so this only passes
        // when the kill reaches the whole process group.
        let engine = CommandEngine::new(EngineId::Primary, "sh")
            .with_args(vec!["-c".into(), "sleep 10 & wait".into()]);
        let image = DynamicImage::new_luma8(8, 8);
        let budget = AttemptBudget::new(Duration::from_millis(100));

        let start = Instant::now();
        let attempt = engine.recognize(&image, &budget);
        assert_eq!(attempt.outcome, AttemptOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_partial_stdout_survives_timeout() {
        let script = "printf 'FV/01/2024\\t0\\t0\\t50\\t10\\t0.9\\n'; sleep 10";
        let engine = CommandEngine::new(EngineId::Primary, "sh")
            .with_args(vec!["-c".into(), script.into()]);
        let image = DynamicImage::new_luma8(8, 8);
        let budget = AttemptBudget::new(Duration::from_millis(200));

        let attempt = engine.recognize(&image, &budget);
        assert_eq!(attempt.outcome, AttemptOutcome::Timeout);
        assert_eq!(attempt.tokens.len(), 1);
        assert_eq!(attempt.tokens[0].text, "FV/01/2024");
    }
}
