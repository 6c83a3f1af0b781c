use std::fmt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{BuildOutput, DescriptorGenerator, ImageBuilder, TestRunner};
use crate::config::ContainerConfig;
use crate::stage::StageResult;

pub const DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Npm,
    Cargo,
    Go,
    Pip,
    Maven,
    Gradle,
    RubyGems,
    Composer,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::Cargo => write!(f, "cargo"),
            Ecosystem::Go => write!(f, "go"),
            Ecosystem::Pip => write!(f, "pip"),
            Ecosystem::Maven => write!(f, "maven"),
            Ecosystem::Gradle => write!(f, "gradle"),
            Ecosystem::RubyGems => write!(f, "rubygems"),
            Ecosystem::Composer => write!(f, "composer"),
        }
    }
}

/// Root manifests in detection priority order.
const MANIFESTS: &[(&str, Ecosystem)] = &[
    ("package.json", Ecosystem::Npm),
    ("Cargo.toml", Ecosystem::Cargo),
    ("go.mod", Ecosystem::Go),
    ("requirements.txt", Ecosystem::Pip),
    ("pyproject.toml", Ecosystem::Pip),
    ("pom.xml", Ecosystem::Maven),
    ("build.gradle", Ecosystem::Gradle),
    ("build.gradle.kts", Ecosystem::Gradle),
    ("Gemfile", Ecosystem::RubyGems),
    ("composer.json", Ecosystem::Composer),
];

struct Profile {
    base_image: &'static str,
    setup: &'static [&'static str],
    test: &'static [&'static str],
}

impl Ecosystem {
    fn profile(self) -> Profile {
        match self {
            Ecosystem::Npm => Profile {
                base_image: "node:20-slim",
                setup: &["npm install"],
                test: &["npm", "test"],
            },
            Ecosystem::Cargo => Profile {
                base_image: "rust:1-slim",
                setup: &["cargo build --tests"],
                test: &["cargo", "test"],
            },
            Ecosystem::Go => Profile {
                base_image: "golang:1.22",
                setup: &["go mod download"],
                test: &["go", "test", "./..."],
            },
            Ecosystem::Pip => Profile {
                base_image: "python:3.12-slim",
                setup: &[
                    "if [ -f requirements.txt ]; then pip install --no-cache-dir -r requirements.txt; fi",
                    "if [ -f pyproject.toml ]; then pip install --no-cache-dir .; fi",
                    "pip install --no-cache-dir pytest",
                ],
                test: &["python", "-m", "pytest"],
            },
            Ecosystem::Maven => Profile {
                base_image: "maven:3-eclipse-temurin-17",
                setup: &["mvn -q -DskipTests dependency:go-offline"],
                test: &["mvn", "-q", "test"],
            },
            Ecosystem::Gradle => Profile {
                base_image: "gradle:8-jdk17",
                setup: &[],
                test: &["gradle", "test", "--no-daemon"],
            },
            Ecosystem::RubyGems => Profile {
                base_image: "ruby:3.3",
                setup: &["bundle install"],
                test: &["bundle", "exec", "rake", "test"],
            },
            Ecosystem::Composer => Profile {
                base_image: "composer:2",
                setup: &["composer install --no-interaction"],
                test: &["composer", "test"],
            },
        }
    }
}

/// First ecosystem whose manifest exists at the root of `project_dir`.
pub fn detect_ecosystem(project_dir: &Path) -> Option<Ecosystem> {
    MANIFESTS
        .iter()
        .find(|(manifest, _)| project_dir.join(manifest).is_file())
        .map(|(_, ecosystem)| *ecosystem)
}

pub fn render_dockerfile(ecosystem: Ecosystem) -> String {
    let profile = ecosystem.profile();
    let mut out = format!("FROM {}\nWORKDIR /app\nCOPY . .\n", profile.base_image);
    for step in profile.setup {
        out.push_str(&format!("RUN {step}\n"));
    }
    let cmd: Vec<String> = profile.test.iter().map(|a| format!("\"{a}\"")).collect();
    out.push_str(&format!("CMD [{}]\n", cmd.join(", ")));
    out
}

/// Writes a Dockerfile inferred from the project's root manifest.
#[derive(Debug, Default)]
pub struct DockerfileGenerator;

impl DockerfileGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DescriptorGenerator for DockerfileGenerator {
    #[instrument(skip(self, project_dir))]
    async fn generate(&self, project_dir: &Path) -> anyhow::Result<StageResult<String>> {
        let target = project_dir.join(DOCKERFILE);
        if target.is_file() {
            return Ok(StageResult::Success(
                "Existing Dockerfile found; using it as-is.".to_string(),
            ));
        }

        let Some(ecosystem) = detect_ecosystem(project_dir) else {
            let known: Vec<&str> = MANIFESTS.iter().map(|(m, _)| *m).collect();
            return Ok(StageResult::Failure(format!(
                "Could not infer project type: none of {} found at project root",
                known.join(", ")
            )));
        };

        debug!(%ecosystem, "generating Dockerfile");
        if let Err(e) = tokio::fs::write(&target, render_dockerfile(ecosystem)).await {
            return Ok(StageResult::Failure(format!("Could not write Dockerfile: {e}")));
        }

        Ok(StageResult::Success(format!(
            "Generated Dockerfile for {ecosystem} project."
        )))
    }
}

fn docker_command(config: &ContainerConfig) -> Command {
    let mut cmd = Command::new(&config.docker_executable);
    if let Some(host) = &config.docker_host {
        cmd.env("DOCKER_HOST", host);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Run `cmd` to completion, returning its exit status and combined output.
async fn run_captured(mut cmd: Command) -> std::io::Result<(bool, String)> {
    let output = cmd.output().await?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    Ok((output.status.success(), text))
}

pub struct DockerImageBuilder {
    config: ContainerConfig,
}

impl DockerImageBuilder {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    #[instrument(skip(self, project_dir))]
    async fn build(&self, project_dir: &Path, image_name: &str) -> anyhow::Result<BuildOutput> {
        let mut cmd = docker_command(&self.config);
        cmd.args(["build", "-t", image_name]).arg(project_dir);

        let output = match run_captured(cmd).await {
            Ok((true, logs)) => BuildOutput {
                result: StageResult::Success(format!("{image_name}:latest")),
                logs,
            },
            Ok((false, logs)) => BuildOutput {
                result: StageResult::Failure("docker build exited with an error".to_string()),
                logs,
            },
            Err(e) => BuildOutput {
                result: StageResult::Failure(format!(
                    "failed to run {}: {e}",
                    self.config.docker_executable.display()
                )),
                logs: String::new(),
            },
        };
        Ok(output)
    }
}

pub struct DockerTestRunner {
    config: ContainerConfig,
}

impl DockerTestRunner {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TestRunner for DockerTestRunner {
    #[instrument(skip(self, _project_dir))]
    async fn run_tests(
        &self,
        image_name: &str,
        _project_dir: &Path,
    ) -> anyhow::Result<StageResult<String>> {
        let mut cmd = docker_command(&self.config);
        cmd.args(["run", "--rm", image_name]);

        let result = match run_captured(cmd).await {
            Ok((true, text)) => StageResult::Success(text),
            Ok((false, text)) => StageResult::Failure(text),
            Err(e) => StageResult::Failure(format!(
                "failed to run {}: {e}",
                self.config.docker_executable.display()
            )),
        };
        Ok(result)
    }
}
