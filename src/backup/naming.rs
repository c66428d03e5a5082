use chrono::NaiveDateTime;
use regex::Regex;

/// Timestamp segment embedded in every backup filename.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// How a backup's payload is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    /// Plain copy of the save file
    Raw,
    /// Single-entry deflate archive
    Zip,
}

impl BackupFormat {
    pub fn extension(self) -> &'static str {
        match self {
            BackupFormat::Raw => "bak",
            BackupFormat::Zip => "zip",
        }
    }
}

/// Maps between live save filenames and backup filenames.
///
/// A backup is named `<original>_<YYYY-MM-DD_HH-MM-SS>.<bak|zip>`, where
/// `<original>` keeps its save extension. The filename is the only durable
/// record of a backup's origin; there is no index file.
#[derive(Debug, Clone)]
pub struct NamingCodec {
    save_extension: String,
    pattern: Regex,
}

impl NamingCodec {
    /// `save_extension` includes its leading dot, e.g. `.save`.
    pub fn new(save_extension: &str) -> Self {
        // Anchored both ends: a non-empty name carrying the save extension,
        // an exact timestamp, and a backup extension. The name capture is
        // greedy, so an original that itself embeds a timestamp-like tail
        // decodes to the longest conforming prefix.
        let pattern = Regex::new(&format!(
            r"^(.+{})_\d{{4}}-\d{{2}}-\d{{2}}_\d{{2}}-\d{{2}}-\d{{2}}\.(?i:bak|zip)$",
            regex::escape(save_extension)
        ))
        .expect("backup filename pattern is a valid regex");
        Self {
            save_extension: save_extension.to_string(),
            pattern,
        }
    }

    pub fn save_extension(&self) -> &str {
        &self.save_extension
    }

    /// True for filenames carrying the protected save extension.
    pub fn is_save_name(&self, file_name: &str) -> bool {
        file_name.len() > self.save_extension.len() && file_name.ends_with(&self.save_extension)
    }

    pub fn encode(&self, original: &str, timestamp: &NaiveDateTime, format: BackupFormat) -> String {
        format!(
            "{original}_{}.{}",
            timestamp.format(TIMESTAMP_FORMAT),
            format.extension()
        )
    }

    /// Recovers the original save filename from a backup filename.
    ///
    /// Total over strings: anything that does not conform to the backup
    /// naming convention is `None`, never an error.
    pub fn decode(&self, backup_filename: &str) -> Option<String> {
        self.pattern
            .captures(backup_filename)
            .map(|captures| captures[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn codec() -> NamingCodec {
        NamingCodec::new(".save")
    }

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, 27)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn encode_embeds_timestamp_and_format() {
        assert_eq!(
            codec().encode("Slot_00000002.save", &timestamp(), BackupFormat::Raw),
            "Slot_00000002.save_2023-10-27_10-30-00.bak"
        );
        assert_eq!(
            codec().encode("Slot_00000002.save", &timestamp(), BackupFormat::Zip),
            "Slot_00000002.save_2023-10-27_10-30-00.zip"
        );
    }

    #[test]
    fn decode_standard_backup_name() {
        assert_eq!(
            codec().decode("Slot_00000002.save_2023-10-27_10-30-00.bak"),
            Some("Slot_00000002.save".to_string())
        );
    }

    #[test]
    fn decode_handles_underscores_in_original_name() {
        assert_eq!(
            codec().decode("My_Awesome_Save_File.save_2025-07-08_18-30-00.bak"),
            Some("My_Awesome_Save_File.save".to_string())
        );
    }

    #[test]
    fn decode_accepts_either_backup_extension_case_insensitively() {
        for name in [
            "slot.save_2024-01-01_12-00-00.zip",
            "slot.save_2024-01-01_12-00-00.BAK",
            "slot.save_2024-01-01_12-00-00.Zip",
        ] {
            assert_eq!(codec().decode(name), Some("slot.save".to_string()), "{name}");
        }
    }

    #[test]
    fn decode_rejects_non_conforming_names() {
        for name in [
            "",
            "NotAValidBackup.txt",
            "Slot_00000002.save",
            // wrong backup extension
            "Slot_00000002.save_2023-10-27_10-30-00.backup",
            // empty original name
            ".save_2023-10-27_10-30-00.bak",
            // malformed timestamps
            "Slot.save_2023-1-1_10-30-00.bak",
            "Slot.save_2023-10-27-10-30-00.bak",
            "Slot.save_10-30-00.bak",
            // trailing garbage past the extension
            "Slot.save_2023-10-27_10-30-00.bak.old",
            // save extension missing from the prefix
            "Slot.sav_2023-10-27_10-30-00.bak",
        ] {
            assert_eq!(codec().decode(name), None, "{name}");
        }
    }

    #[test]
    fn decode_takes_longest_prefix_on_embedded_collision() {
        // An original whose own name ends in something shaped like an
        // encoded tail still round-trips: the trailing segment wins.
        let original = "Odd.save_2024-01-01_00-00-00.bak.save";
        let encoded = codec().encode(original, &timestamp(), BackupFormat::Raw);
        assert_eq!(codec().decode(&encoded), Some(original.to_string()));
    }

    #[test]
    fn is_save_name_requires_nonempty_stem() {
        let codec = codec();
        assert!(codec.is_save_name("Slot1.save"));
        assert!(!codec.is_save_name(".save"));
        assert!(!codec.is_save_name("Slot1.txt"));
    }

    #[test]
    fn codec_honors_configured_extension() {
        let codec = NamingCodec::new(".sav");
        assert_eq!(
            codec.decode("quick.sav_2024-06-01_08-00-00.bak"),
            Some("quick.sav".to_string())
        );
        assert_eq!(codec.decode("quick.save_2024-06-01_08-00-00.bak"), None);
    }

    proptest! {
        #[test]
        fn round_trips_any_valid_original(stem in "[A-Za-z0-9 _-]{1,24}") {
            let codec = codec();
            let original = format!("{stem}.save");
            for format in [BackupFormat::Raw, BackupFormat::Zip] {
                let encoded = codec.encode(&original, &timestamp(), format);
                prop_assert_eq!(codec.decode(&encoded), Some(original.clone()));
            }
        }
    }
}
