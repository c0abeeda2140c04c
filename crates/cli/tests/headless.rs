#![forbid(unsafe_code)]

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::io;
    use std::process::{Child, Command, Output, Stdio};
    use std::thread::sleep;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn memtrack() -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_memtrack"));
        command
            .env("MEMTRACK_LOG", "info")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn sleeper() -> io::Result<Child> {
        Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
    }

    fn wait_for_output(mut child: Child) -> io::Result<Output> {
        let start = Instant::now();
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if start.elapsed() > Duration::from_secs(20) {
                let _ = child.kill();
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "memtrack did not exit",
                ));
            }
            sleep(Duration::from_millis(50));
        }
        child.wait_with_output()
    }

    #[test]
    fn list_shows_the_test_process() -> io::Result<()> {
        let pid = std::process::id().to_string();
        let output = wait_for_output(
            memtrack()
                .args(["list", "--metric", "rss", "--filter", &pid])
                .spawn()?,
        )?;
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        assert!(lines.next().is_some_and(|header| header.contains("RSS MB")));
        assert!(lines.any(|line| line.split_whitespace().next() == Some(pid.as_str())));
        Ok(())
    }

    #[test]
    fn record_exports_csv() -> io::Result<()> {
        let dir = tempdir()?;
        let mut child = sleeper()?;
        let pid = child.id().to_string();

        let output = wait_for_output(
            memtrack()
                .args(["record", "-p", &pid, "-n", "idle child", "-d", "1", "-i", "100"])
                .arg("--export-dir")
                .arg(dir.path())
                .spawn()?,
        )?;
        let _ = child.kill();
        let _ = child.wait();

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success(), "stdout: {stdout}");
        assert!(stdout.contains("operation: idle child"));
        assert!(stdout.contains("change:"));
        assert!(stdout.contains("exported to"));

        let files: Vec<_> = fs::read_dir(dir.path())?.collect::<Result<_, _>>()?;
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().to_string_lossy().to_string();
        assert!(name.starts_with("memory_change_idle_child_"));
        assert!(name.ends_with(".csv"));

        let text = fs::read_to_string(files[0].path())?;
        let header = text.lines().next().unwrap_or_default();
        assert_eq!(header, format!("时间戳,相对时间(秒),sleep(pid={pid})"));
        assert!(text.lines().count() > 2);
        Ok(())
    }

    #[test]
    fn record_uses_configured_export_directory() -> io::Result<()> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.toml");
        let export_dir = dir.path().join("out");
        fs::create_dir(&export_dir)?;
        fs::write(
            &config_path,
            format!(
                "[sampling]\ninterval_ms = 100\n\n[export]\ndirectory = {:?}\n",
                export_dir.display().to_string()
            ),
        )?;

        let mut child = sleeper()?;
        let pid = child.id().to_string();
        let output = wait_for_output(
            memtrack()
                .arg("--config")
                .arg(&config_path)
                .args(["record", "-p", &pid, "-n", "cfg", "-d", "0.5"])
                .spawn()?,
        )?;
        let _ = child.kill();
        let _ = child.wait();

        assert!(output.status.success());
        assert_eq!(fs::read_dir(&export_dir)?.count(), 1);
        Ok(())
    }

    #[test]
    fn record_rejects_unknown_pid() -> io::Result<()> {
        let dir = tempdir()?;
        let output = wait_for_output(
            memtrack()
                .args(["record", "-p", "4194305", "-n", "ghost", "-d", "1"])
                .arg("--export-dir")
                .arg(dir.path())
                .spawn()?,
        )?;
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("cannot record process 4194305"));
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
