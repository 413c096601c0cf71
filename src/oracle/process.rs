// src/oracle/process.rs
// Production oracle: runs the external trajectory engine as a child process

use super::{OracleRequest, OracleResponse, PeriodOracle};
use crate::config::file::OracleSection;
use crate::error::{OrbitError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

/// Stderr tail kept in error messages
const STDERR_TAIL_CHARS: usize = 500;

/// JSON artifact written by the engine.
///
/// `period` is null when no cycle was found within the budget.
#[derive(Debug, Deserialize)]
struct EngineOutput {
    period: Option<u64>,
    #[serde(default, alias = "unique_states_visited")]
    states_visited: u64,
    #[serde(default, alias = "exploration_time_ms")]
    elapsed_ms: u64,
    #[serde(default)]
    reached_cycle: Option<bool>,
}

/// Invokes the engine once per query:
/// `<program> <args..> --moves A,B --max-iterations N --output <file>`
pub struct ProcessOracle {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    scratch_dir: PathBuf,
    timeout_base: Duration,
    timeout_per_iteration: Duration,
}

impl ProcessOracle {
    pub fn new(section: &OracleSection) -> Result<Self> {
        if section.program.trim().is_empty() {
            return Err(OrbitError::Config("oracle program is empty".to_string()));
        }
        let scratch_dir = section
            .scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("orbit-chaos"));
        std::fs::create_dir_all(&scratch_dir)?;

        Ok(Self {
            program: section.program.clone(),
            args: section.args.clone(),
            working_dir: section.working_dir.clone(),
            scratch_dir,
            timeout_base: Duration::from_secs(section.timeout_base_secs),
            timeout_per_iteration: Duration::from_micros(section.timeout_per_iteration_us),
        })
    }

    /// Wall-clock allowance for a query, derived from its iteration budget
    pub fn timeout_for(&self, max_iterations: u64) -> Duration {
        let scaled = self
            .timeout_per_iteration
            .saturating_mul(u32::try_from(max_iterations).unwrap_or(u32::MAX));
        self.timeout_base.saturating_add(scaled)
    }

    fn command(&self, request: &OracleRequest, output_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--moves")
            .arg(request.sequence.to_wire())
            .arg("--max-iterations")
            .arg(request.max_iterations.to_string())
            .arg("--output")
            .arg(output_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Per-query output file, removed when the query ends however it ends
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(dir: &Path) -> Self {
        Self(dir.join(format!("oracle_{}.json", Uuid::new_v4())))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[async_trait]
impl PeriodOracle for ProcessOracle {
    async fn query(&self, request: &OracleRequest) -> Result<OracleResponse> {
        let scratch = ScratchFile::new(&self.scratch_dir);
        let budget = self.timeout_for(request.max_iterations);

        debug!(
            oracle = self.name(),
            sequence = %request.sequence,
            max_iterations = request.max_iterations,
            timeout = ?budget,
            "Querying oracle"
        );

        // Dropping the future on timeout kills the child (kill_on_drop)
        let result = timeout(budget, self.command(request, scratch.path()).output()).await;

        let output = match result {
            Err(_) => {
                return Err(OrbitError::OracleUnavailable(format!(
                    "{} timed out after {:?} on {}",
                    self.program, budget, request.sequence
                )));
            }
            Ok(Err(e)) => {
                return Err(OrbitError::OracleUnavailable(format!(
                    "failed to run {}: {}",
                    self.program, e
                )));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrbitError::OracleUnavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr_tail(&stderr)
            )));
        }

        let contents = tokio::fs::read_to_string(scratch.path()).await.map_err(|e| {
            OrbitError::OracleUnavailable(format!(
                "engine wrote no result at {}: {}",
                scratch.path().display(),
                e
            ))
        })?;

        parse_engine_output(&contents, request)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Turn the engine's JSON artifact into a response or a typed failure
pub fn parse_engine_output(contents: &str, request: &OracleRequest) -> Result<OracleResponse> {
    let parsed: EngineOutput = serde_json::from_str(contents).map_err(|e| {
        OrbitError::OracleUnavailable(format!("unparsable engine output: {}", e))
    })?;

    let period = match (parsed.period, parsed.reached_cycle) {
        (None, _) | (_, Some(false)) => {
            return Err(OrbitError::OracleExhausted {
                sequence: request.sequence.to_string(),
                max_iterations: request.max_iterations,
            });
        }
        (Some(0), _) => {
            return Err(OrbitError::OracleUnavailable(format!(
                "engine reported period 0 for {}",
                request.sequence
            )));
        }
        (Some(p), _) => p,
    };

    Ok(OracleResponse {
        period,
        states_visited: parsed.states_visited,
        elapsed: Duration::from_millis(parsed.elapsed_ms),
    })
}

fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    match trimmed.char_indices().rev().nth(STDERR_TAIL_CHARS) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::MoveSequence;

    fn request() -> OracleRequest {
        OracleRequest::new(MoveSequence::from_names(&["FR", "UF"]).unwrap(), 20_000)
    }

    // ============================================================================
    // Output parsing
    // ============================================================================

    #[test]
    fn test_parse_engine_artifact() {
        let json = r#"{
            "puzzle_id": "ft_hypercube:3",
            "move_sequence": ["FR", "UF"],
            "period": 10080,
            "transient_length": 0,
            "unique_states_visited": 10080,
            "max_iterations": 20000,
            "reached_cycle": true,
            "exploration_time_ms": 1234
        }"#;
        let resp = parse_engine_output(json, &request()).unwrap();
        assert_eq!(resp.period, 10080);
        assert_eq!(resp.states_visited, 10080);
        assert_eq!(resp.elapsed, Duration::from_millis(1234));
    }

    #[test]
    fn test_parse_wire_field_names() {
        let json = r#"{"period": 6, "states_visited": 6, "elapsed_ms": 3}"#;
        let resp = parse_engine_output(json, &request()).unwrap();
        assert_eq!(resp.period, 6);
        assert_eq!(resp.elapsed, Duration::from_millis(3));
    }

    #[test]
    fn test_null_period_is_exhaustion() {
        let json = r#"{"period": null, "unique_states_visited": 20001, "reached_cycle": false}"#;
        let err = parse_engine_output(json, &request()).unwrap_err();
        assert!(matches!(err, OrbitError::OracleExhausted { max_iterations: 20_000, .. }));
    }

    #[test]
    fn test_zero_period_is_malformed() {
        let err = parse_engine_output(r#"{"period": 0}"#, &request()).unwrap_err();
        assert!(matches!(err, OrbitError::OracleUnavailable(_)));
    }

    #[test]
    fn test_garbage_is_unavailable() {
        let err = parse_engine_output("Loading puzzle catalog...", &request()).unwrap_err();
        assert!(matches!(err, OrbitError::OracleUnavailable(_)));
    }

    // ============================================================================
    // Process handling
    // ============================================================================

    fn section(program: &str) -> OracleSection {
        OracleSection {
            program: program.to_string(),
            args: Vec::new(),
            scratch_dir: Some(std::env::temp_dir().join("orbit-chaos-tests")),
            ..OracleSection::default()
        }
    }

    #[test]
    fn test_timeout_scales_with_budget() {
        let oracle = ProcessOracle::new(&section("ctrl")).unwrap();
        assert!(oracle.timeout_for(100_000) > oracle.timeout_for(1_000));
        assert!(oracle.timeout_for(0) >= Duration::from_secs(1));
    }

    #[test]
    fn test_empty_program_rejected() {
        assert!(matches!(
            ProcessOracle::new(&section("  ")),
            Err(OrbitError::Config(_))
        ));
    }

    /// `sh -c script` as the engine; the query flags land in $0..$5, so the
    /// output path is "$5"
    fn shell(script: &str, scratch: &Path) -> OracleSection {
        OracleSection {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            scratch_dir: Some(scratch.to_path_buf()),
            ..OracleSection::default()
        }
    }

    fn scratch_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_engine_artifact_is_read_and_removed() {
        let scratch = tempfile::tempdir().unwrap();
        let script = r#"[ "$1" = "FR,UF" ] && [ "$3" = "20000" ] || exit 9
printf '{"period": 10080, "unique_states_visited": 10080, "reached_cycle": true, "exploration_time_ms": 5}' > "$5""#;
        let oracle = ProcessOracle::new(&shell(script, scratch.path())).unwrap();

        let resp = oracle.query(&request()).await.unwrap();
        assert_eq!(resp.period, 10080);
        assert_eq!(resp.states_visited, 10080);
        assert_eq!(resp.elapsed, Duration::from_millis(5));
        assert_eq!(scratch_files(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_engine_exhaustion_is_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let script = r#"printf '{"period": null, "reached_cycle": false}' > "$5""#;
        let oracle = ProcessOracle::new(&shell(script, scratch.path())).unwrap();

        let err = oracle.query(&request()).await.unwrap_err();
        assert!(matches!(err, OrbitError::OracleExhausted { max_iterations: 20_000, .. }));
        assert_eq!(scratch_files(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let scratch = tempfile::tempdir().unwrap();
        let oracle =
            ProcessOracle::new(&shell("echo 'no such puzzle' >&2; exit 3", scratch.path())).unwrap();

        let err = oracle.query(&request()).await.unwrap_err();
        assert!(matches!(err, OrbitError::OracleUnavailable(_)));
        assert!(err.to_string().contains("no such puzzle"));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_unavailable() {
        let scratch = tempfile::tempdir().unwrap();
        let oracle = ProcessOracle::new(&shell("exit 0", scratch.path())).unwrap();
        let err = oracle.query(&request()).await.unwrap_err();
        assert!(err.to_string().contains("wrote no result"));
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let scratch = tempfile::tempdir().unwrap();
        let section = OracleSection {
            timeout_base_secs: 0,
            timeout_per_iteration_us: 5,
            ..shell("sleep 10", scratch.path())
        };
        let oracle = ProcessOracle::new(&section).unwrap();
        assert_eq!(oracle.timeout_for(20_000), Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = oracle.query(&request()).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, OrbitError::OracleUnavailable(_)));
        let msg = err.to_string();
        assert!(msg.contains("timed out after 100ms"), "{}", msg);
        assert_eq!(scratch_files(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_dropped_query_leaves_no_scratch_file() {
        let scratch = tempfile::tempdir().unwrap();
        let script = r#"printf '{}' > "$5"; sleep 10"#;
        let oracle = ProcessOracle::new(&shell(script, scratch.path())).unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(300), oracle.query(&request())).await;
        assert!(abandoned.is_err());
        assert_eq!(scratch_files(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let oracle = ProcessOracle::new(&section("/nonexistent/orbit-engine")).unwrap();
        let err = oracle.query(&request()).await.unwrap_err();
        assert!(matches!(err, OrbitError::OracleUnavailable(_)));
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = "x".repeat(2_000) + "boom";
        let tail = stderr_tail(&long);
        assert!(tail.ends_with("boom"));
        assert!(tail.len() <= STDERR_TAIL_CHARS + 1);
    }
}
