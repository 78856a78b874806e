//! Shell scripts standing in for the FFmpeg executables.
//!
//! They answer `-version`, honor the `-i <input> ... <output>` shape of the
//! conversion arguments and print progress the way `-progress pipe:2` does,
//! so the real process-driving code can be tested without FFmpeg installed.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::transcoder::{PROBE_ASSET, TRANSCODER_ASSET};

/// Duration reported by the fake probe, in seconds.
pub const FAKE_DURATION_SECS: f64 = 2.0;

/// Bytes the fake transcoder writes as its output.
pub const FAKE_OUTPUT: &[u8] = b"fake-mp4";

/// How the fake transcoder behaves once past its input check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeEngineBehavior {
    /// Reports progress and writes the output.
    Succeed,
    /// Like `Succeed`, after printing a Latin-1 metadata line.
    SucceedWithLatin1Log,
    /// Prints an error and exits non-zero.
    Fail,
    /// Exits cleanly without writing the output.
    NoOutput,
    /// Never finishes.
    Hang,
}

const TRANSCODER_PRELUDE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version 7.1-fake Copyright (c) 2000-2024 the FFmpeg developers"
    exit 0
fi

input=""
output=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then
        input="$arg"
    fi
    prev="$arg"
    output="$arg"
done

if [ ! -f "$input" ]; then
    echo "$input: No such file or directory" >&2
    exit 1
fi
"#;

const SUCCEED_BODY: &str = r#"echo "out_time_us=500000" >&2
echo "progress=continue" >&2
echo "[libx264 @ 0x5581c0] fake encoder using cpu capabilities: none" >&2
echo "out_time_us=1000000" >&2
echo "progress=continue" >&2
echo "out_time_us=2000000" >&2
echo "progress=end" >&2
printf 'fake-mp4' > "$output"
exit 0
"#;

/// Script body of the fake transcoder.
pub fn transcoder_script(behavior: FakeEngineBehavior) -> String {
    let body = match behavior {
        FakeEngineBehavior::Succeed => SUCCEED_BODY,
        FakeEngineBehavior::SucceedWithLatin1Log => {
            // 0xE9 is "é" in Latin-1 and invalid on its own in UTF-8
            return format!(
                "{}printf '    title           : caf\\351\\n' >&2\n{}",
                TRANSCODER_PRELUDE, SUCCEED_BODY
            );
        }
        FakeEngineBehavior::Fail => {
            r#"echo "out_time_us=500000" >&2
echo "[matroska,webm @ 0x5581c0] EBML header parsing failed" >&2
echo "Conversion failed!" >&2
exit 1
"#
        }
        FakeEngineBehavior::NoOutput => {
            r#"echo "out_time_us=2000000" >&2
echo "progress=end" >&2
exit 0
"#
        }
        FakeEngineBehavior::Hang => "exec sleep 30\n",
    };
    format!("{}{}", TRANSCODER_PRELUDE, body)
}

/// Script body of the fake probe.
pub fn probe_script() -> String {
    format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffprobe version 7.1-fake Copyright (c) 2007-2024 the FFmpeg developers"
    exit 0
fi
echo '{{"format":{{"duration":"{:.6}"}}}}'
"#,
        FAKE_DURATION_SECS
    )
}

/// Writes both fake executables into `dir`.
pub fn install(dir: &Path, behavior: FakeEngineBehavior) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    write_executable(&dir.join(TRANSCODER_ASSET), &transcoder_script(behavior))?;
    write_executable(&dir.join(PROBE_ASSET), &probe_script())
}

fn write_executable(path: &Path, script: &str) -> io::Result<()> {
    std::fs::write(path, script)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}
