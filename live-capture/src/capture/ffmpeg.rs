//! FFmpeg command line for a capture attempt.

use std::path::Path;

use super::process_runner::CaptureCommand;

/// Build the ffmpeg invocation that copies `media_url` into `output_path`.
///
/// Streams are copied without re-encoding. When `max_duration_secs` is set the
/// output is bounded with `-t` and ffmpeg exits on its own once it is reached.
pub fn build_capture_command(
    ffmpeg_path: &str,
    media_url: &str,
    output_path: &Path,
    max_duration_secs: Option<u64>,
) -> CaptureCommand {
    let mut args: Vec<String> = Vec::with_capacity(20);

    // 1. Quiet, non-interactive output
    args.extend(["-y", "-hide_banner", "-loglevel", "error"].map(String::from));

    // 2. Input
    args.extend(["-i".to_string(), media_url.to_string()]);

    // 3. Lossless copy with timestamps kept monotonic
    args.extend(
        [
            "-c",
            "copy",
            "-copyts",
            "-avoid_negative_ts",
            "make_zero",
        ]
        .map(String::from),
    );

    // 4. Optional duration bound
    if let Some(secs) = max_duration_secs {
        args.extend(["-t".to_string(), secs.to_string()]);
    }

    // 5. Output
    args.extend(["-fflags".to_string(), "+genpts".to_string()]);
    args.push(output_path.to_string_lossy().to_string());

    CaptureCommand::new(ffmpeg_path, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_build_without_max_duration() {
        let cmd = build_capture_command(
            "ffmpeg",
            "https://cdn.example.com/live/hd.m3u8",
            Path::new("/tmp/out/alice_1.ts"),
            None,
        );

        assert_eq!(cmd.program, "ffmpeg");
        let input = position(&cmd.args, "-i").expect("-i present");
        assert_eq!(cmd.args[input + 1], "https://cdn.example.com/live/hd.m3u8");
        let codec = position(&cmd.args, "-c").expect("-c present");
        assert_eq!(cmd.args[codec + 1], "copy");
        assert!(position(&cmd.args, "-t").is_none());
        assert_eq!(cmd.args.last().unwrap(), "/tmp/out/alice_1.ts");
    }

    #[test]
    fn test_build_with_max_duration() {
        let cmd = build_capture_command(
            "/usr/local/bin/ffmpeg",
            "https://cdn.example.com/live/hd.m3u8",
            Path::new("out.ts"),
            Some(3600),
        );

        assert_eq!(cmd.program, "/usr/local/bin/ffmpeg");
        let t = position(&cmd.args, "-t").expect("-t present");
        assert_eq!(cmd.args[t + 1], "3600");
        // The bound is an output option: it must follow the input URL.
        assert!(t > position(&cmd.args, "-i").unwrap());
    }
}
