//! Stand-in for the piper binary
//!
//! A POSIX shell script that accepts piper's arguments, reads the text from
//! stdin and writes it verbatim to the `-f` output path. Magic words in the
//! text change its behavior:
//! - `FAIL`: print to stderr and exit 1
//! - `SLOW`: sleep one second before writing
//! - `NOOUT`: exit 0 without writing anything
//!
//! Every invocation appends its `--length-scale` value to `calls.log`.
//!
//! [`FakePiper::install_chatty`] installs a variant that logs one stderr line
//! per input line as it reads, the way the real engine does.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tts_common::Settings;

/// Voice installed in every fake models directory
pub const TEST_VOICE: &str = "en_US-test-medium";

const SCRIPT: &str = r#"#!/bin/sh
out=""
scale=""
while [ $# -gt 0 ]; do
    case "$1" in
        --help) exit 0 ;;
        -f) out="$2"; shift 2 ;;
        --length-scale) scale="$2"; shift 2 ;;
        *) shift ;;
    esac
done
__READ__
echo "$scale" >> "__LOG__"
case "$text" in
    *FAIL*) echo "synthetic failure" >&2; exit 1 ;;
    *SLOW*) sleep 1 ;;
    *NOOUT*) exit 0 ;;
esac
printf '%s' "$text" > "$out"
"#;

const READ_ALL: &str = "text=$(cat)";

const READ_LOGGING: &str = r#"text=""
while IFS= read -r line || [ -n "$line" ]; do
    echo "[piper] [info] Real-time factor: 0.04 (infer=0.08 sec, audio=2.00 sec)" >&2
    text="$text$line "
done"#;

pub struct FakePiper {
    dir: TempDir,
}

impl FakePiper {
    /// Script plus a models directory holding [`TEST_VOICE`]
    pub fn install() -> Self {
        Self::install_with(READ_ALL)
    }

    /// Same as [`FakePiper::install`], logging to stderr per input line
    pub fn install_chatty() -> Self {
        Self::install_with(READ_LOGGING)
    }

    fn install_with(reader: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let fake = Self { dir };

        let script = SCRIPT
            .replace("__READ__", reader)
            .replace("__LOG__", &fake.log_path().display().to_string());
        std::fs::write(fake.binary(), script).unwrap();
        make_executable(&fake.binary());

        std::fs::create_dir_all(fake.models_dir()).unwrap();
        std::fs::write(fake.models_dir().join(format!("{}.onnx", TEST_VOICE)), b"onnx").unwrap();
        std::fs::write(fake.models_dir().join(format!("{}.onnx.json", TEST_VOICE)), b"{}").unwrap();

        fake
    }

    pub fn binary(&self) -> PathBuf {
        self.dir.path().join("piper")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.dir.path().join("models")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Length scales passed so far, one per invocation
    pub fn length_scales(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn invocations(&self) -> usize {
        self.length_scales().len()
    }

    /// Settings pointing at this fake with [`TEST_VOICE`] selected
    pub fn settings(&self) -> Settings {
        Settings {
            engine_binary: self.binary(),
            models_dir: self.models_dir(),
            voice: TEST_VOICE.to_string(),
            chunk_size: 100,
            synthesis_timeout_secs: 10,
            ..Settings::default()
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
