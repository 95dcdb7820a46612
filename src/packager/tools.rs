//! External tool invocation.
//!
//! Every third-party program (fpm, ronn, WiX, makeappx, bash) is reached
//! through [`ToolRunner`], which runs one process to completion and turns a
//! non-zero exit into [`Error::ToolInvocationError`]. Tests substitute a fake
//! runner; production uses [`ProcessRunner`].

use regex::Regex;
use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::SystemTime,
};

use super::error::{Error, Result};

/// Alternate install root for Ruby gems on SUSE/RedHat hosts, where gem
/// binaries are not added to `PATH`.
pub const GEMS_ROOT: &str = "/usr/lib64/ruby/gems";

/// One process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program path or name.
    pub program: PathBuf,
    /// Arguments in order.
    pub args: Vec<String>,
    /// Working directory.
    pub current_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl ToolInvocation {
    /// Invocation of `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Short program name for messages.
    pub fn tool_name(&self) -> String {
        self.program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Space-joined command line for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ToolOutput {
    /// Output with the given stdout.
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Last non-empty stdout line.
    pub fn last_line(&self) -> Option<&str> {
        self.stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Runs external tools.
pub trait ToolRunner: Send + Sync {
    /// Runs `invocation` to completion.
    ///
    /// Non-zero exit fails with [`Error::ToolInvocationError`] carrying the
    /// captured output.
    fn run(&self, invocation: ToolInvocation) -> impl Future<Output = Result<ToolOutput>> + Send;

    /// Finds `tool`, returning its path.
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Runs real processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    gems_root: Option<PathBuf>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            gems_root: Some(PathBuf::from(GEMS_ROOT)),
        }
    }
}

impl ProcessRunner {
    /// Runner with the default gem fallback location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that only searches `PATH`.
    pub fn without_gem_fallback() -> Self {
        Self { gems_root: None }
    }
}

impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput> {
        log::debug!("Running: {}", invocation.command_line());

        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args);
        command.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|error| Error::CommandFailed {
            command: invocation.tool_name(),
            error,
        })?;

        let captured = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            return Err(Error::ToolInvocationError {
                tool: invocation.tool_name(),
                code: output.status.code(),
                output: format!("{}{}", captured.stdout, captured.stderr),
            });
        }
        Ok(captured)
    }

    fn locate(&self, tool: &str) -> Option<PathBuf> {
        match which::which(tool) {
            Ok(path) => Some(path),
            Err(e) => {
                log::debug!("{} not found in PATH: {}", tool, e);
                let found = self
                    .gems_root
                    .as_deref()
                    .and_then(|root| find_in_gems(root, tool));
                if let Some(path) = &found {
                    log::info!("Using {} from gem directory {}", tool, path.display());
                }
                found
            }
        }
    }
}

/// Locates `tool` or fails with [`Error::DependencyMissing`].
pub fn precheck<R: ToolRunner>(runner: &R, tool: &str, remediation: &str) -> Result<PathBuf> {
    runner.locate(tool).ok_or_else(|| Error::DependencyMissing {
        tool: tool.to_string(),
        remediation: remediation.to_string(),
    })
}

/// Best-effort search for a gem executable below `gems_root`.
///
/// Picks the most recently modified Ruby version directory, then the most
/// recently modified file named `tool` inside its `gems` tree.
pub fn find_in_gems(gems_root: &Path, tool: &str) -> Option<PathBuf> {
    let newest_ruby = walkdir::WalkDir::new(gems_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .max_by_key(|e| modified(e.path()))?;

    walkdir::WalkDir::new(newest_ruby.path().join("gems"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == tool)
        .max_by_key(|e| modified(e.path()))
        .map(|e| e.into_path())
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// `:path=>"<value>"` entry of an fpm status hash.
static FPM_PATH_PATTERN: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"path=>"([^"]+)""#));

/// Extracts the created package path from fpm's final output line.
///
/// fpm reports success as a Ruby hash such as
/// `{:timestamp=>"…", :message=>"Created package", :path=>"pkg_1.0_amd64.deb"}`.
pub fn parse_artifact_path(output: &ToolOutput) -> Result<PathBuf> {
    let line = output.last_line().unwrap_or_default();
    let pattern = FPM_PATH_PATTERN.as_ref().map_err(Clone::clone)?;
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| PathBuf::from(m.as_str()))
        .ok_or_else(|| Error::UnparseableToolOutput {
            line: line.to_string(),
        })
}

/// Scripted runner for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&ToolInvocation) -> Result<ToolOutput> + Send + Sync>;

    /// Records every invocation and answers with a handler.
    pub(crate) struct FakeRunner {
        calls: Mutex<Vec<ToolInvocation>>,
        handler: Handler,
        missing: Vec<String>,
    }

    impl FakeRunner {
        pub(crate) fn new(
            handler: impl Fn(&ToolInvocation) -> Result<ToolOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                handler: Box::new(handler),
                missing: Vec::new(),
            }
        }

        /// Makes `locate` fail for `tool`.
        pub(crate) fn missing(mut self, tool: &str) -> Self {
            self.missing.push(tool.to_string());
            self
        }

        pub(crate) fn calls(&self) -> Vec<ToolInvocation> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn calls_to(&self, tool: &str) -> Vec<ToolInvocation> {
            self.calls()
                .into_iter()
                .filter(|c| c.tool_name() == tool)
                .collect()
        }
    }

    impl ToolRunner for FakeRunner {
        async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            (self.handler)(&invocation)
        }

        fn locate(&self, tool: &str) -> Option<PathBuf> {
            if self.missing.iter().any(|m| m == tool) {
                None
            } else {
                Some(PathBuf::from("/usr/local/bin").join(tool))
            }
        }
    }

    /// Mimics `ronn --roff <file>.ronn` by writing `<file>` next to it.
    pub(crate) fn fake_ronn(invocation: &ToolInvocation) -> Result<ToolOutput> {
        if let Some(source) = invocation.args.last() {
            let roff = Path::new(source).with_extension("");
            std::fs::write(&roff, ".TH POWERSHELL 1\n")?;
        }
        Ok(ToolOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fpm_success_line() {
        let output = ToolOutput::from_stdout(
            "Setting workdir\n\
             {:timestamp=>\"2017-11-14T10:00:00\", :message=>\"Created package\", :path=>\"powershell_6.0.0-1.ubuntu.16.04_amd64.deb\"}\n\n",
        );
        assert_eq!(
            parse_artifact_path(&output).unwrap(),
            PathBuf::from("powershell_6.0.0-1.ubuntu.16.04_amd64.deb")
        );
    }

    #[test]
    fn path_pattern_is_shared_between_parses() {
        for package in ["a.deb", "b.rpm"] {
            let output = ToolOutput::from_stdout(format!("{{:path=>\"{}\"}}", package));
            assert_eq!(parse_artifact_path(&output).unwrap(), PathBuf::from(package));
        }
        let first = FPM_PATH_PATTERN.as_ref().unwrap() as *const Regex;
        let second = FPM_PATH_PATTERN.as_ref().unwrap() as *const Regex;
        assert_eq!(first, second);
    }

    #[test]
    fn only_last_line_counts() {
        let output = ToolOutput::from_stdout(
            ":path=>\"early.deb\"\n{:message=>\"Something else\"}",
        );
        let err = parse_artifact_path(&output).unwrap_err();
        assert!(matches!(err, Error::UnparseableToolOutput { ref line } if line.contains("Something else")));
    }

    #[test]
    fn empty_output_is_unparseable() {
        let err = parse_artifact_path(&ToolOutput::default()).unwrap_err();
        assert!(matches!(err, Error::UnparseableToolOutput { .. }));
    }

    #[test]
    fn invocation_command_line() {
        let invocation = ToolInvocation::new("/usr/local/bin/fpm")
            .args(["--force", "--verbose"])
            .arg("-t")
            .arg("deb");
        assert_eq!(invocation.tool_name(), "fpm");
        assert_eq!(invocation.command_line(), "/usr/local/bin/fpm --force --verbose -t deb");
    }

    #[test]
    fn gem_fallback_finds_newest_ruby_tree() {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("2.1.0/gems/fpm-1.9.3/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("fpm"), "#!/bin/sh\n").unwrap();

        assert_eq!(find_in_gems(root.path(), "fpm"), Some(bin.join("fpm")));
        assert_eq!(find_in_gems(root.path(), "ronn"), None);
        assert_eq!(find_in_gems(&root.path().join("absent"), "fpm"), None);
    }

    #[tokio::test]
    async fn precheck_reports_remediation() {
        let runner = ProcessRunner::without_gem_fallback();
        let err = precheck(&runner, "definitely_not_a_real_tool_12345", "gem install it").unwrap_err();
        match err {
            Error::DependencyMissing { tool, remediation } => {
                assert_eq!(tool, "definitely_not_a_real_tool_12345");
                assert_eq!(remediation, "gem install it");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_captures_failure_output() {
        let runner = ProcessRunner::without_gem_fallback();
        let err = runner
            .run(ToolInvocation::new("sh").args(["-c", "echo boom; exit 3"]))
            .await
            .unwrap_err();
        match err {
            Error::ToolInvocationError { tool, code, output } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let ok = runner
            .run(ToolInvocation::new("sh").args(["-c", "echo done"]))
            .await
            .unwrap();
        assert_eq!(ok.last_line(), Some("done"));
    }
}
