// src/install/strategies.rs

//! Per-platform strategy plans
//!
//! Order for every platform: system package manager, official installer,
//! portable download, manual instructions. Mechanisms that do not exist on
//! a platform are simply left out.

use super::{CommandStep, InstallStrategy, ProvisionOptions};
use crate::exec::ExecutionRequest;
use crate::platform::{OsFamily, PackageManagerFamily, PlatformInfo};

/// Version requested when the caller does not name one
pub const DEFAULT_VERSION: &str = "lts";

/// Exit code msiexec uses for "installed, reboot required"
const MSI_REBOOT_REQUIRED: i32 = 3010;

/// Build the ordered strategy list for `platform`
pub fn plan_strategies(platform: &PlatformInfo, options: &ProvisionOptions) -> Vec<InstallStrategy> {
    let portable = InstallStrategy::Portable {
        version: options.version.trim_start_matches('v').to_string(),
    };
    if options.portable_only {
        return vec![portable];
    }

    let plan = Planner { platform, options };
    let mut strategies = match platform.os {
        OsFamily::MacOs => plan.macos(),
        OsFamily::Windows => plan.windows(),
        OsFamily::Linux => plan.linux(),
        OsFamily::Other(_) => Vec::new(),
    };
    strategies.push(portable);
    strategies.push(InstallStrategy::Manual {
        instructions: manual_instructions(platform, options),
    });
    strategies
}

struct Planner<'a> {
    platform: &'a PlatformInfo,
    options: &'a ProvisionOptions,
}

impl Planner<'_> {
    fn macos(&self) -> Vec<InstallStrategy> {
        let mut strategies = vec![InstallStrategy::PackageManager {
            manager: "homebrew".to_string(),
            steps: vec![
                CommandStep::probe(self.plain("brew", &["--version"])),
                CommandStep::action(self.plain("brew", &["install", "node"])),
                self.verify(),
            ],
        }];

        if let Some(version) = self.exact_version() {
            let url = format!("{}/v{}/node-v{}.pkg", self.mirror(), version, version);
            let pkg = std::env::temp_dir().join(format!("node-v{}.pkg", version));
            let pkg = pkg.to_string_lossy();
            strategies.push(InstallStrategy::OfficialInstaller {
                name: "pkg".to_string(),
                steps: vec![
                    CommandStep::action(self.plain("curl", &["-fsSL", "-o", &pkg, &url])),
                    CommandStep::action(self.privileged("installer", &["-pkg", &pkg, "-target", "/"])),
                    self.verify(),
                ],
            });
        }
        strategies
    }

    fn windows(&self) -> Vec<InstallStrategy> {
        let mut strategies = vec![
            InstallStrategy::PackageManager {
                manager: "winget".to_string(),
                steps: vec![
                    CommandStep::probe(self.plain("winget", &["--version"])),
                    CommandStep::action(self.plain(
                        "winget",
                        &[
                            "install",
                            "--exact",
                            "--id",
                            "OpenJS.NodeJS.LTS",
                            "--silent",
                            "--accept-package-agreements",
                            "--accept-source-agreements",
                        ],
                    )),
                    self.verify(),
                ],
            },
            InstallStrategy::PackageManager {
                manager: "chocolatey".to_string(),
                steps: vec![
                    CommandStep::probe(self.plain("choco", &["--version"])),
                    CommandStep::action(self.plain("choco", &["install", "nodejs-lts", "-y"])),
                    self.verify(),
                ],
            },
        ];

        if let (Some(version), Some(arch)) = (self.exact_version(), self.platform.arch.dist_name()) {
            let url = format!(
                "{}/v{}/node-v{}-{}.msi",
                self.mirror(),
                version,
                version,
                arch
            );
            let msi = std::env::temp_dir().join(format!("node-v{}-{}.msi", version, arch));
            let msi = msi.to_string_lossy();
            strategies.push(InstallStrategy::OfficialInstaller {
                name: "msi".to_string(),
                steps: vec![
                    CommandStep::action(self.plain("curl.exe", &["-fsSL", "-o", &msi, &url])),
                    CommandStep::action(self.plain("msiexec", &["/i", &msi, "/qn", "/norestart"]))
                        .accepting([MSI_REBOOT_REQUIRED]),
                    self.verify(),
                ],
            });
        }
        strategies
    }

    fn linux(&self) -> Vec<InstallStrategy> {
        let family = self.platform.package_manager_family();
        let Some(program) = family.program() else {
            return Vec::new();
        };

        let mut steps = vec![CommandStep::probe(self.plain(program, &["--version"]))];
        let install: &[&str] = match family {
            PackageManagerFamily::Apt => {
                steps.push(CommandStep::action(self.apt(&["update"])));
                &["install", "-y", "nodejs", "npm"]
            }
            PackageManagerFamily::Dnf | PackageManagerFamily::Yum => {
                &["install", "-y", "nodejs", "npm"]
            }
            PackageManagerFamily::Pacman => &["-S", "--noconfirm", "--needed", "nodejs", "npm"],
            PackageManagerFamily::Apk => &["add", "--no-cache", "nodejs", "npm"],
            PackageManagerFamily::Zypper => {
                &["--non-interactive", "install", "nodejs-default", "npm-default"]
            }
            PackageManagerFamily::Emerge => &["--ask=n", "net-libs/nodejs"],
            PackageManagerFamily::None => return Vec::new(),
        };
        let action = match family {
            PackageManagerFamily::Apt => self.apt(install),
            _ => self.privileged(program, install),
        };
        steps.push(CommandStep::action(action));
        steps.push(self.verify());

        let mut strategies = vec![InstallStrategy::PackageManager {
            manager: program.to_string(),
            steps,
        }];
        if let Some(nodesource) = self.nodesource(family) {
            strategies.push(nodesource);
        }
        strategies
    }

    /// NodeSource setup script plus a package install, for apt and rpm families
    fn nodesource(&self, family: PackageManagerFamily) -> Option<InstallStrategy> {
        let (host, program) = match family {
            PackageManagerFamily::Apt => ("deb.nodesource.com", "apt-get"),
            PackageManagerFamily::Dnf => ("rpm.nodesource.com", "dnf"),
            PackageManagerFamily::Yum => ("rpm.nodesource.com", "yum"),
            _ => return None,
        };
        let stream = self
            .numeric_version()
            .and_then(|v| v.split('.').next())
            .unwrap_or("lts");
        let url = format!("https://{}/setup_{}.x", host, stream);
        let script = std::env::temp_dir().join("nodesource_setup.sh");
        let script = script.to_string_lossy();

        let install = if family == PackageManagerFamily::Apt {
            self.apt(&["install", "-y", "nodejs"])
        } else {
            self.privileged(program, &["install", "-y", "nodejs"])
        };

        Some(InstallStrategy::OfficialInstaller {
            name: "nodesource".to_string(),
            steps: vec![
                CommandStep::probe(self.plain("curl", &["--version"])),
                CommandStep::action(self.plain("curl", &["-fsSL", "-o", &script, &url])),
                CommandStep::action(self.privileged("bash", &[&script])),
                CommandStep::action(install),
                self.verify(),
            ],
        })
    }

    /// `node --version`, which must report the requested release when it is
    /// numeric; `lts` and `latest` accept whatever got installed
    fn verify(&self) -> CommandStep {
        let node = format!("node{}", self.platform.exe_suffix());
        let step = CommandStep::verify(self.plain(&node, &["--version"]));
        match self.numeric_version() {
            Some(version) => step.expecting_version(version),
            None => step,
        }
    }

    fn plain(&self, program: &str, args: &[&str]) -> ExecutionRequest {
        ExecutionRequest::new(program)
            .args(args.iter().copied())
            .timeout(self.options.step_timeout)
    }

    /// A command needing root; `sudo -n` fails fast instead of prompting
    fn privileged(&self, program: &str, args: &[&str]) -> ExecutionRequest {
        if self.options.use_sudo && !self.platform.is_root_user() && !self.platform.is_windows() {
            ExecutionRequest::new("sudo")
                .args(["-n", program])
                .args(args.iter().copied())
                .timeout(self.options.step_timeout)
        } else {
            self.plain(program, args)
        }
    }

    fn apt(&self, args: &[&str]) -> ExecutionRequest {
        let request = self.privileged("apt-get", args);
        if request.program() == "sudo" {
            // sudo resets the environment, so pass the variable through env(1)
            let mut wrapped = vec!["-n", "env", "DEBIAN_FRONTEND=noninteractive", "apt-get"];
            wrapped.extend_from_slice(args);
            ExecutionRequest::new("sudo")
                .args(wrapped)
                .timeout(self.options.step_timeout)
        } else {
            request.env("DEBIAN_FRONTEND", "noninteractive")
        }
    }

    fn mirror(&self) -> &str {
        self.options.mirror.trim_end_matches('/')
    }

    /// The requested version when it is `major`, `major.minor` or exact
    fn numeric_version(&self) -> Option<&str> {
        let version = self.options.version.trim().trim_start_matches('v');
        let parts: Vec<&str> = version.split('.').collect();
        let numeric = parts.len() <= 3
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        numeric.then_some(version)
    }

    /// The requested version when it names an exact release
    fn exact_version(&self) -> Option<String> {
        let version = self.options.version.trim_start_matches('v');
        semver::Version::parse(version)
            .ok()
            .map(|_| version.to_string())
    }
}

fn manual_instructions(platform: &PlatformInfo, options: &ProvisionOptions) -> String {
    let hint = match platform.os {
        OsFamily::MacOs => "run the .pkg installer or `brew install node`",
        OsFamily::Windows => "run the .msi installer or `winget install OpenJS.NodeJS.LTS`",
        OsFamily::Linux => "install the `nodejs` and `npm` packages with your distribution's package manager",
        OsFamily::Other(_) => "build Node.js from source",
    };
    format!(
        "Install Node.js {} manually from {} ({}), then make sure `node` and `npm` are on PATH",
        options.version,
        options.mirror.trim_end_matches('/'),
        hint
    )
}
