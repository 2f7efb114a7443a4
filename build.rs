//! Stages the FFmpeg shared libraries next to the binary on Windows when the
//! `ffmpeg` feature is enabled. Other targets link the system libraries.

fn main() {
    println!("cargo:rerun-if-changed=third_party/ffmpeg/bin");
    if std::env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    #[cfg(target_os = "windows")]
    windows::stage_ffmpeg_dlls();
}

#[cfg(target_os = "windows")]
mod windows {
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;

    const LIBRARY_PREFIXES: &[&str] =
        &["avcodec-", "avformat-", "avutil-", "swresample-", "swscale-"];

    pub fn stage_ffmpeg_dlls() {
        let ffmpeg_bin = PathBuf::from("third_party/ffmpeg/bin");
        if !ffmpeg_bin.exists() {
            println!("cargo:warning=FFmpeg DLLs not found at {}", ffmpeg_bin.display());
            return;
        }
        println!("cargo:rustc-link-search=native={}", ffmpeg_bin.display());

        // OUT_DIR is target/<profile>/build/<crate>/out
        let Some(out_dir) = std::env::var_os("OUT_DIR").map(PathBuf::from) else {
            return;
        };
        let Some(target_dir) = out_dir.ancestors().nth(3) else {
            println!("cargo:warning=Cannot resolve target dir from {}", out_dir.display());
            return;
        };
        let Ok(entries) = std::fs::read_dir(&ffmpeg_bin) else {
            println!("cargo:warning=Cannot read {}", ffmpeg_bin.display());
            return;
        };

        for path in entries.flatten().map(|e| e.path()).filter(|p| is_ffmpeg_library(p)) {
            let Some(name) = path.file_name() else {
                continue;
            };
            let dest = target_dir.join(name);
            if dest.exists() && modified(&path) <= modified(&dest) {
                continue;
            }
            match std::fs::copy(&path, &dest) {
                Ok(_) => println!("cargo:warning=Copied {} to output dir", path.display()),
                Err(e) => println!("cargo:warning=Failed to copy {}: {}", path.display(), e),
            }
        }
    }

    fn modified(path: &Path) -> SystemTime {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn is_ffmpeg_library(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let lower = name.to_ascii_lowercase();
        lower.ends_with(".dll") && LIBRARY_PREFIXES.iter().any(|p| lower.starts_with(p))
    }
}
