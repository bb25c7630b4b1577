#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use twtools::interval::Interval;
use twtools::task::{Task, TaskStatus};

/// Uuid the stub task store reports for `add`.
pub const CREATED_UUID: &str = "5c1c2c0a-6a6b-4d4e-9a3b-2f1f0e0d0c0b";

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0)
        .single()
        .expect("valid date")
}

pub fn task(uuid: &str, id: u64, project: &str, label: &str) -> Task {
    Task {
        uuid: uuid.to_string(),
        id,
        label: Some(label.to_string()),
        project: Some(project.to_string()),
        status: TaskStatus::Pending,
        description: format!("work on {label}"),
        modified: at(1),
        wait: None,
        annotations: Vec::new(),
        depends: Vec::new(),
        tags: Vec::new(),
    }
}

pub fn interval(id: u64, open: bool, tags: &[&str]) -> Interval {
    Interval {
        id,
        start: at(2),
        end: if open { None } else { Some(at(3)) },
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

/// Temp directory holding stub `task` / `timew` executables, their export
/// data, their call logs and a config pointing at all of it.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new(tasks: &[Task], intervals: &[Interval]) -> std::io::Result<Self> {
        let env = Self {
            dir: tempfile::tempdir()?,
        };
        fs::create_dir_all(env.notes_dir())?;
        env.write_tasks(tasks)?;
        env.write_intervals(intervals)?;
        env.write_stub("task", "tasks.json", "task.log")?;
        env.write_stub("timew", "intervals.json", "timew.log")?;
        env.write_config(&env.path().join("task"), &env.path().join("timew"))?;
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.path().join("renames.jsonl")
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.path().join("notes")
    }

    pub fn write_tasks(&self, tasks: &[Task]) -> std::io::Result<()> {
        fs::write(self.path().join("tasks.json"), serde_json::to_string(tasks)?)
    }

    pub fn write_intervals(&self, intervals: &[Interval]) -> std::io::Result<()> {
        fs::write(
            self.path().join("intervals.json"),
            serde_json::to_string(intervals)?,
        )
    }

    pub fn write_note(&self, uuid: &str, text: &str) -> std::io::Result<()> {
        fs::write(self.notes_dir().join(format!("{uuid}.md")), text)
    }

    /// Point the config at other executables (e.g. a missing one).
    pub fn write_config(&self, task: &Path, timew: &Path) -> std::io::Result<()> {
        let content = format!(
            "[task]\ncommand = \"{}\"\n\n[interval]\ncommand = \"{}\"\n\n[notes]\ndir = \"{}\"\n\n[journal]\npath = \"{}\"\n",
            task.display(),
            timew.display(),
            self.notes_dir().display(),
            self.journal_path().display(),
        );
        fs::write(self.config_path(), content)
    }

    pub fn task_log(&self) -> String {
        fs::read_to_string(self.path().join("task.log")).unwrap_or_default()
    }

    pub fn timew_log(&self) -> String {
        fs::read_to_string(self.path().join("timew.log")).unwrap_or_default()
    }

    pub fn faketime_log(&self) -> String {
        fs::read_to_string(self.path().join("faketime.log")).unwrap_or_default()
    }

    /// Records piped to the `faketime` stub, one JSON document per line.
    pub fn imported(&self) -> Vec<serde_json::Value> {
        fs::read_to_string(self.path().join("imported.jsonl"))
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Route imports through a stub `faketime` that logs its arguments and
    /// keeps whatever is piped to it.
    #[cfg(unix)]
    pub fn use_faketime_stub(&self) -> std::io::Result<()> {
        use std::io::Write;

        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$*\" >> \"{log}\"\n\
             cat >> \"{input}\"\n\
             printf '\\n' >> \"{input}\"\n",
            log = self.path().join("faketime.log").display(),
            input = self.path().join("imported.jsonl").display(),
        );
        self.write_script("faketime", &script)?;
        let mut config = fs::OpenOptions::new().append(true).open(self.config_path())?;
        writeln!(
            config,
            "\n[import]\nfaketime = \"{}\"",
            self.path().join("faketime").display()
        )
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = twtools_cmd();
        cmd.env("TWTOOLS_CONFIG", self.config_path());
        cmd
    }

    #[cfg(unix)]
    fn write_stub(&self, name: &str, data: &str, log: &str) -> std::io::Result<()> {
        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$*\" >> \"{log}\"\n\
             for arg in \"$@\"; do\n\
             \x20 case \"$arg\" in\n\
             \x20   export) cat \"{data}\"; exit 0 ;;\n\
             \x20   add) echo \"Created task {CREATED_UUID}.\"; exit 0 ;;\n\
             \x20 esac\n\
             done\n\
             exit 0\n",
            log = self.path().join(log).display(),
            data = self.path().join(data).display(),
        );
        self.write_script(name, &script)
    }

    #[cfg(unix)]
    fn write_script(&self, name: &str, script: &str) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path().join(name);
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
    }

    #[cfg(not(unix))]
    fn write_stub(&self, _name: &str, _data: &str, _log: &str) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn twtools_cmd() -> Command {
    let mut cmd = Command::cargo_bin("twtools").expect("twtools binary");
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("TWTOOLS_CONFIG");
    cmd
}
