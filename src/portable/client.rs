// src/portable/client.rs

//! Ready-to-use handle for one Node.js installation
//!
//! Every method comes in two flavours: a `*_request` builder returning an
//! [`ExecutionRequest`] (so commands can be batched or streamed by the
//! caller) and a runner that executes it immediately.

use super::PortableInstallRecord;
use crate::error::{Error, Result};
use crate::exec::{ExecutionRequest, ExecutionResult, ProcessExecutor};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Flags for `npm install`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Record under `devDependencies`
    pub dev: bool,
    /// Install into the global prefix
    pub global: bool,
    /// Pin the exact version instead of a caret range
    pub exact: bool,
}

impl InstallOptions {
    pub fn dev() -> Self {
        Self {
            dev: true,
            ..Self::default()
        }
    }

    pub fn global() -> Self {
        Self {
            global: true,
            ..Self::default()
        }
    }

    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }
}

/// Flags for `npm publish`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub tag: Option<String>,
    /// "public" or "restricted"
    pub access: Option<String>,
    pub dry_run: bool,
}

/// Handle on a `node` + `npm` pair
#[derive(Debug, Clone)]
pub struct PackageManagerClient {
    runtime: PathBuf,
    package_manager: PathBuf,
    bin_dir: PathBuf,
    working_dir: Option<PathBuf>,
    executor: ProcessExecutor,
}

impl PackageManagerClient {
    pub fn new(runtime: PathBuf, package_manager: PathBuf, executor: ProcessExecutor) -> Self {
        let bin_dir = runtime
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            runtime,
            package_manager,
            bin_dir,
            working_dir: None,
            executor,
        }
    }

    /// Client for a portable install
    pub fn from_record(record: &PortableInstallRecord, executor: ProcessExecutor) -> Self {
        Self::new(
            record.runtime_path.clone(),
            record.package_manager_path.clone(),
            executor,
        )
    }

    /// Client for the `node` and `npm` found on `PATH`
    pub fn system(executor: ProcessExecutor) -> Result<Self> {
        let runtime = which::which("node")
            .map_err(|e| Error::VersionNotInstalled(format!("system (node not on PATH: {})", e)))?;
        let package_manager = which::which("npm")
            .map_err(|e| Error::VersionNotInstalled(format!("system (npm not on PATH: {})", e)))?;
        Ok(Self::new(runtime, package_manager, executor))
    }

    /// Run every command in `dir` (normally the project root)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn runtime_path(&self) -> &Path {
        &self.runtime
    }

    pub fn package_manager_path(&self) -> &Path {
        &self.package_manager
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    /// `npm <args>` with this installation's `bin` first on `PATH`
    pub fn npm_request<I, S>(&self, args: I) -> ExecutionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prepare(ExecutionRequest::new(self.package_manager.to_string_lossy()).args(args))
    }

    /// `node <args>` with this installation's `bin` first on `PATH`
    pub fn node_request<I, S>(&self, args: I) -> ExecutionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prepare(ExecutionRequest::new(self.runtime.to_string_lossy()).args(args))
    }

    fn prepare(&self, mut request: ExecutionRequest) -> ExecutionRequest {
        if let Some(path) = self.search_path() {
            request = request.env("PATH", path);
        }
        match &self.working_dir {
            Some(dir) => request.current_dir(dir),
            None => request,
        }
    }

    /// `bin_dir` followed by the inherited `PATH`
    fn search_path(&self) -> Option<String> {
        let mut dirs = vec![self.bin_dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(dirs)
            .ok()
            .map(OsString::into_string)
            .and_then(|r| r.ok())
    }

    pub fn install_request(&self, packages: &[&str], options: InstallOptions) -> ExecutionRequest {
        let mut args = vec!["install".to_string()];
        if options.dev {
            args.push("--save-dev".to_string());
        }
        if options.global {
            args.push("--global".to_string());
        }
        if options.exact {
            args.push("--save-exact".to_string());
        }
        args.extend(packages.iter().map(|p| p.to_string()));
        self.npm_request(args)
    }

    pub fn uninstall_request(&self, packages: &[&str], global: bool) -> ExecutionRequest {
        let mut args = vec!["uninstall".to_string()];
        if global {
            args.push("--global".to_string());
        }
        args.extend(packages.iter().map(|p| p.to_string()));
        self.npm_request(args)
    }

    /// `npm update`; an empty list updates everything
    pub fn update_request(&self, packages: &[&str]) -> ExecutionRequest {
        self.npm_request(std::iter::once("update").chain(packages.iter().copied()))
    }

    /// `npm ls --json`, optionally limited to `depth`
    pub fn list_request(&self, depth: Option<u32>, global: bool) -> ExecutionRequest {
        let mut args = vec!["ls".to_string(), "--json".to_string()];
        if let Some(depth) = depth {
            args.push(format!("--depth={}", depth));
        }
        if global {
            args.push("--global".to_string());
        }
        self.npm_request(args)
    }

    pub fn search_request(&self, term: &str) -> ExecutionRequest {
        self.npm_request(["search", "--json", term])
    }

    /// `npm view <package> version`: the latest published version
    pub fn view_version_request(&self, package: &str) -> ExecutionRequest {
        self.npm_request(["view", package, "version"])
    }

    pub fn publish_request(&self, options: &PublishOptions) -> ExecutionRequest {
        let mut args = vec!["publish".to_string()];
        if let Some(tag) = &options.tag {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        if let Some(access) = &options.access {
            args.push("--access".to_string());
            args.push(access.clone());
        }
        if options.dry_run {
            args.push("--dry-run".to_string());
        }
        self.npm_request(args)
    }

    pub fn init_request(&self, yes: bool) -> ExecutionRequest {
        if yes {
            self.npm_request(["init", "--yes"])
        } else {
            self.npm_request(["init"])
        }
    }

    /// `npm run <script> [-- args]`
    pub fn run_script_request(&self, script: &str, args: &[&str]) -> ExecutionRequest {
        let mut full = vec!["run".to_string(), script.to_string()];
        if !args.is_empty() {
            full.push("--".to_string());
            full.extend(args.iter().map(|a| a.to_string()));
        }
        self.npm_request(full)
    }

    pub fn install(&self, packages: &[&str], options: InstallOptions) -> Result<ExecutionResult> {
        self.executor.run(&self.install_request(packages, options))
    }

    pub fn uninstall(&self, packages: &[&str], global: bool) -> Result<ExecutionResult> {
        self.executor.run(&self.uninstall_request(packages, global))
    }

    pub fn update(&self, packages: &[&str]) -> Result<ExecutionResult> {
        self.executor.run(&self.update_request(packages))
    }

    pub fn list(&self, depth: Option<u32>, global: bool) -> Result<ExecutionResult> {
        self.executor.run(&self.list_request(depth, global))
    }

    pub fn search(&self, term: &str) -> Result<ExecutionResult> {
        self.executor.run(&self.search_request(term))
    }

    pub fn publish(&self, options: &PublishOptions) -> Result<ExecutionResult> {
        self.executor.run(&self.publish_request(options))
    }

    pub fn init(&self, yes: bool) -> Result<ExecutionResult> {
        self.executor.run(&self.init_request(yes))
    }

    pub fn run_script(&self, script: &str, args: &[&str]) -> Result<ExecutionResult> {
        self.executor.run(&self.run_script_request(script, args))
    }

    /// npm's own version, e.g. "10.2.4"
    pub fn version(&self) -> Result<String> {
        self.version_of(self.npm_request(["--version"]))
    }

    /// The runtime's version without the leading `v`, e.g. "20.11.1"
    pub fn node_version(&self) -> Result<String> {
        self.version_of(self.node_request(["--version"]))
    }

    fn version_of(&self, request: ExecutionRequest) -> Result<String> {
        let result = self.executor.run(&request)?;
        if !result.success() {
            return Err(Error::IoError(format!(
                "`{}` failed: {}",
                request.command_line(),
                result.error().unwrap_or("unknown error")
            )));
        }
        Ok(result
            .stdout()
            .unwrap_or_default()
            .trim()
            .trim_start_matches('v')
            .to_string())
    }
}
