use protocol_recorder::{OutputFormat, ProtocolConfig, SttProvider, SupervisorConfig};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_defaults() {
    let cfg = ProtocolConfig::from_pairs(Vec::<(&str, &str)>::new()).unwrap();

    assert_eq!(cfg.stt_provider, SttProvider::Deepgram);
    assert_eq!(cfg.stt_language, "de");
    assert_eq!(cfg.output_format, OutputFormat::Both);
    assert_eq!(cfg.protocols_dir, PathBuf::from("protocols"));
    assert!(cfg.enable_statistics);
    assert_eq!(cfg.idle_timeout_minutes, 5);
    assert_eq!(cfg.idle_timeout(), Some(Duration::from_secs(300)));
}

#[test]
fn test_recognized_values() {
    let cfg = ProtocolConfig::from_pairs([
        ("stt_provider", "Speechmatics"),
        ("output_format", "json"),
        ("protocols_dir", "/tmp/protocols"),
        ("enable_statistics", "false"),
        ("idle_timeout_minutes", "0"),
    ])
    .unwrap();

    assert_eq!(cfg.stt_provider, SttProvider::Speechmatics);
    assert_eq!(cfg.output_format, OutputFormat::Json);
    assert_eq!(cfg.protocols_dir, PathBuf::from("/tmp/protocols"));
    assert!(!cfg.enable_statistics);
    assert_eq!(cfg.idle_timeout(), None);
    assert_eq!(SupervisorConfig::from(&cfg).idle_timeout, None);
}

#[test]
fn test_unknown_values_fall_back_to_defaults() {
    let cfg = ProtocolConfig::from_pairs([
        ("stt_provider", "whisper"),
        ("output_format", "xml"),
        ("idle_timeout_minutes", "soon"),
    ])
    .unwrap();

    assert_eq!(cfg.stt_provider, SttProvider::Deepgram);
    assert_eq!(cfg.output_format, OutputFormat::Both);
    assert_eq!(cfg.idle_timeout_minutes, 5);
}

#[test]
fn test_output_format_sinks() {
    assert!(OutputFormat::Txt.writes_text());
    assert!(!OutputFormat::Txt.writes_records());
    assert!(!OutputFormat::Json.writes_text());
    assert!(OutputFormat::Json.writes_records());
    assert!(OutputFormat::Both.writes_text() && OutputFormat::Both.writes_records());
}

#[test]
fn test_provider_settings() {
    let deepgram = SttProvider::Deepgram.settings("en");
    assert_eq!(deepgram.model.as_deref(), Some("nova-3"));
    assert_eq!(deepgram.endpointing_ms, Some(500));
    assert!(deepgram.smart_format && deepgram.no_delay);
    assert_eq!(deepgram.language, "en");

    let speechmatics = SttProvider::Speechmatics.settings("de");
    assert_eq!(speechmatics.operating_point.as_deref(), Some("enhanced"));
    assert!(speechmatics.enable_entities);

    let openai = SttProvider::OpenAi.settings("de");
    assert_eq!(openai.model, None);
    assert_eq!(SttProvider::OpenAi.to_string(), "openai");
}

#[test]
fn test_config_file_enables_debug() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("recorder.toml");
    std::fs::write(&path, "debug = \"true\"\nstt_language = \"en\"\n").unwrap();

    let cfg = ProtocolConfig::load(path.to_str()).unwrap();

    assert!(cfg.debug);
    assert_eq!(cfg.stt_language, "en");
    assert!(!ProtocolConfig::from_pairs([("debug", "no")]).unwrap().debug);
}
