//! Stray encoder cleanup
//!
//! The recorder's `kill_on_drop` backstop covers panicking tests, but a
//! SIGKILLed test runner can still leave encoder processes behind. This finds
//! ffmpeg processes whose command line references the harness video directory
//! and kills them.

use std::path::Path;

/// Kill leftover encoder processes writing into `video_dir`.
///
/// Returns the number of killed processes. Unix only; elsewhere this is a
/// no-op.
pub async fn cleanup_stray_encoders(video_dir: &Path) -> u32 {
    #[cfg(unix)]
    {
        cleanup_stray_encoders_unix(video_dir).await
    }

    #[cfg(not(unix))]
    {
        let _ = video_dir;
        0
    }
}

#[cfg(unix)]
async fn cleanup_stray_encoders_unix(video_dir: &Path) -> u32 {
    use std::process::Command;
    use tracing::info;

    let output = match Command::new("ps").args(["aux"]).output() {
        Ok(o) => o,
        Err(_) => return 0,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let dir_token = video_dir.to_string_lossy();

    let mut killed = 0u32;
    for pid in find_stray_encoders(&stdout, &dir_token) {
        info!("Killing stray encoder PID {}", pid);
        let _ = Command::new("kill").args(["-9", &pid.to_string()]).output();
        killed += 1;
    }

    if killed > 0 {
        info!("Cleaned up {} stray encoder processes", killed);
    }

    killed
}

/// Pick encoder PIDs out of `ps aux` output.
///
/// A line counts when it names ffmpeg and references the harness video
/// directory. The PID is the second whitespace-separated field.
fn find_stray_encoders(ps_output: &str, dir_token: &str) -> Vec<u32> {
    ps_output
        .lines()
        .filter(|line| line.contains("ffmpeg") && line.contains(dir_token))
        .filter_map(|line| {
            line.split_whitespace()
                .nth(1)
                .and_then(|s| s.parse::<u32>().ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_encoder_writing_into_video_dir() {
        let ps = "root 4242 0.5 1.0 123 456 ? S 10:00 0:01 ffmpeg -y -f x11grab -i :99 saved_videos/login_flow.mp4\n";
        assert_eq!(find_stray_encoders(ps, "saved_videos"), vec![4242]);
    }

    #[test]
    fn ignores_unrelated_ffmpeg() {
        let ps = "root 10 0.0 0.0 1 2 ? S 10:00 0:00 ffmpeg -i movie.mkv out.mp4\n";
        assert!(find_stray_encoders(ps, "saved_videos").is_empty());
    }

    #[test]
    fn ignores_other_processes_in_video_dir() {
        let ps = "root 11 0.0 0.0 1 2 ? S 10:00 0:00 ls saved_videos\n";
        assert!(find_stray_encoders(ps, "saved_videos").is_empty());
    }

    #[test]
    fn skips_lines_without_numeric_pid() {
        let ps = "USER PID %CPU %MEM VSZ RSS TTY STAT START TIME ffmpeg saved_videos\n";
        assert!(find_stray_encoders(ps, "saved_videos").is_empty());
    }
}
