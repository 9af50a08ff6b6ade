use fs_err::OpenOptions;
use std::io::{self, BufWriter};
use view_telemetry_core::{JsonLinesSink, SinkConfig, SinkKind, TelemetrySink, TracingSink};

pub fn build_sink(config: &SinkConfig) -> Result<Box<dyn TelemetrySink>, String> {
    match config.kind {
        SinkKind::Tracing => Ok(Box::new(TracingSink)),
        SinkKind::Stdout => Ok(Box::new(JsonLinesSink::new(io::stdout()))),
        SinkKind::File => {
            let path = config
                .path
                .as_ref()
                .ok_or("sink.path is required for the file sink")?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs_err::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| e.to_string())?;
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use view_telemetry_protocol::{SearchEvent, TelemetryRecord};

    #[test]
    fn file_sink_appends_json_lines() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("out").join("records.jsonl");
        let config = SinkConfig {
            kind: SinkKind::File,
            path: Some(path.clone()),
        };

        for _ in 0..2 {
            let mut sink = build_sink(&config).expect("sink");
            sink.emit(&TelemetryRecord::Search(SearchEvent::new("economy", Utc::now())))
                .expect("emit");
        }

        let content = fs_err::read_to_string(&path).expect("read");
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn file_sink_without_path_is_an_error() {
        let config = SinkConfig {
            kind: SinkKind::File,
            path: None,
        };
        assert!(build_sink(&config).is_err());
    }
}
