//! The fixed WebM to MP4 transcoding profile.

/// Name of the input file inside the engine filesystem.
pub const INPUT_NAME: &str = "input.webm";

/// Name of the output file inside the engine filesystem.
pub const OUTPUT_NAME: &str = "output.mp4";

/// MIME type of the produced file.
pub const OUTPUT_MIME_TYPE: &str = "video/mp4";

/// Encoder settings for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp4Profile {
    pub video_codec: &'static str,
    pub preset: &'static str,
    pub crf: u8,
    pub audio_codec: &'static str,
    pub audio_bitrate_kbps: u32,
}

/// H.264 at CRF 23 with the medium preset, AAC audio at 128 kb/s.
pub const WEBM_TO_MP4: Mp4Profile = Mp4Profile {
    video_codec: "libx264",
    preset: "medium",
    crf: 23,
    audio_codec: "aac",
    audio_bitrate_kbps: 128,
};

impl Mp4Profile {
    /// Builds the engine argument vector that reads `input` and writes `output`.
    pub fn args(&self, input: &str, output: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string(),
            "-c:v".to_string(),
            self.video_codec.to_string(),
            "-preset".to_string(),
            self.preset.to_string(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            self.audio_codec.to_string(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate_kbps),
            output.to_string(),
        ]
    }
}

/// The argument vector of the single supported conversion.
pub fn webm_to_mp4_args() -> Vec<String> {
    WEBM_TO_MP4.args(INPUT_NAME, OUTPUT_NAME)
}

/// Returns the value following the first `-i` flag.
pub fn input_name(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "-i")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
