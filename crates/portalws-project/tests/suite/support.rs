use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Mutex;

use portalws_process::{CommandOutput, CommandRunner};
use portalws_project::{ArtifactFetcher, Coordinate, FetchError};
use walkdir::WalkDir;

pub(crate) fn testdata_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(rel)
}

pub(crate) fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent dirs");
    fs::write(path, contents).expect("write file");
}

/// Copy a testdata tree so a test can add caches next to it.
pub(crate) fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from) {
        let entry = entry.expect("walk testdata");
        let rel = entry.path().strip_prefix(from).expect("relative path");
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).expect("create dir");
        } else {
            fs::copy(entry.path(), &target).expect("copy file");
        }
    }
}

/// Maven local repository path of `coordinate`'s jar.
pub(crate) fn maven_jar(repo: &Path, coordinate: &Coordinate) -> PathBuf {
    let group = coordinate.group.as_deref().expect("grouped coordinate");
    repo.join(group.replace('.', "/"))
        .join(&coordinate.name)
        .join(&coordinate.version)
        .join(format!("{}-{}.jar", coordinate.name, coordinate.version))
}

/// Records every fetch; optionally "downloads" the coordinates it knows how to serve.
#[derive(Debug, Default)]
pub(crate) struct RecordingFetcher {
    calls: Mutex<Vec<Vec<Coordinate>>>,
    repo: Option<PathBuf>,
    servable: Vec<Coordinate>,
    fail: bool,
}

impl RecordingFetcher {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn serving(repo: &Path, servable: Vec<Coordinate>) -> Self {
        Self {
            repo: Some(repo.to_path_buf()),
            servable,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Coordinate>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ArtifactFetcher for RecordingFetcher {
    fn fetch(&self, coordinates: &[Coordinate]) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(coordinates.to_vec());
        if self.fail {
            return Err(FetchError::Io {
                path: PathBuf::from("pom.xml"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "network unreachable"),
            });
        }
        if let Some(repo) = &self.repo {
            for coordinate in coordinates.iter().filter(|c| self.servable.contains(c)) {
                write_file(&maven_jar(repo, coordinate), "");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub(crate) cwd: PathBuf,
    pub(crate) program: PathBuf,
    pub(crate) args: Vec<String>,
    /// The generated `pom.xml`, read while the scratch directory still exists.
    pub(crate) pom: Option<String>,
}

/// Fake package manager: records the invocation and writes the given jars.
#[derive(Debug)]
pub(crate) struct FakeCommandRunner {
    invocations: Mutex<Vec<Invocation>>,
    status: ExitStatus,
    downloads: Vec<PathBuf>,
}

impl FakeCommandRunner {
    pub(crate) fn new(status: ExitStatus, downloads: Vec<PathBuf>) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            status,
            downloads,
        }
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> std::io::Result<CommandOutput> {
        self.invocations.lock().unwrap().push(Invocation {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
            pom: fs::read_to_string(cwd.join("pom.xml")).ok(),
        });
        for jar in &self.downloads {
            write_file(jar, "");
        }
        Ok(CommandOutput {
            status: self.status,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            timed_out: false,
        })
    }
}

pub(crate) fn success_status() -> ExitStatus {
    exit_status(0)
}

pub(crate) fn failure_status() -> ExitStatus {
    exit_status(1)
}

fn exit_status(code: i32) -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }
}
