use std::path::PathBuf;

use mds_provider::config::{DumpOptions, LoadOptions};
use mds_provider::files::{FileName, ProviderDataFiles, Source};
use mds_provider::{
    DateFormat, EncodingContext, MdsError, RawValue, RecordType, Reconciled, ValueEncoder, Version,
};
use serde_json::Value;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn source(name: &str) -> Source {
    Source::from(fixture(name))
}

fn pages_only() -> LoadOptions {
    LoadOptions {
        flatten: false,
        ..LoadOptions::default()
    }
}

#[tokio::test]
async fn test_load_single_page_file() {
    let files = ProviderDataFiles::new(Some(RecordType::StatusChanges), [source("status_changes_0.2.0.json")])
        .unwrap();
    let records = files
        .load_records(None, &[], &LoadOptions::default())
        .await
        .unwrap();

    match records {
        Reconciled::Merged(batch) => {
            assert_eq!(batch.version, Version::new(0, 2, 0));
            assert_eq!(batch.records.len(), 2);
            assert_eq!(batch.records[1]["event_type"], "reserved");
        }
        other => panic!("expected merged records, got {other:?}"),
    }
}

#[tokio::test]
async fn test_load_page_list_merges_in_order() {
    let files = ProviderDataFiles::new(Some(RecordType::Trips), [source("trips_0.3.0.json")]).unwrap();
    let records = files
        .load_records(None, &[], &LoadOptions::default())
        .await
        .unwrap();

    let Reconciled::Merged(batch) = records else {
        panic!("expected merged records");
    };
    let providers: Vec<_> = batch
        .records
        .iter()
        .map(|r| r["provider_name"].as_str().unwrap())
        .collect();
    assert_eq!(providers, ["Lime", "Lime", "Bird"]);
}

#[tokio::test]
async fn test_mixed_versions_refuse_to_merge() {
    let files = ProviderDataFiles::new(Some(RecordType::Trips), [source("mixed")]).unwrap();
    let err = files
        .load_records(None, &[], &LoadOptions::default())
        .await
        .unwrap_err();

    match err.downcast_ref::<MdsError>() {
        Some(MdsError::UnexpectedVersion { actual, expected }) => {
            assert_eq!(*actual, Version::new(0, 4, 0));
            assert_eq!(*expected, Version::new(0, 3, 0));
        }
        other => panic!("expected UnexpectedVersion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_mixed_versions_kept_as_pages() {
    let files = ProviderDataFiles::new(Some(RecordType::Trips), [source("mixed")]).unwrap();
    let records = files.load_records(None, &[], &pages_only()).await.unwrap();

    let Reconciled::Pages(pages) = records else {
        panic!("expected separate pages");
    };
    let versions: Vec<_> = pages.iter().map(|p| p.version).collect();
    assert_eq!(versions, [Version::new(0, 3, 0), Version::new(0, 4, 0)]);
    assert_eq!(pages.iter().map(|p| p.records.len()).sum::<usize>(), 2);
}

#[tokio::test]
async fn test_load_payloads_filters_by_record_type() {
    let files = ProviderDataFiles::new(
        None,
        [source("status_changes_0.2.0.json"), source("trips_0.3.0.json")],
    )
    .unwrap();

    let all = files
        .load_payloads(None, &[], &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let trips = files
        .load_payloads(Some(RecordType::Trips), &[], &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(trips.len(), 2);
    assert!(trips.iter().all(|p| p["data"].get("trips").is_some()));

    let unflattened = files
        .load_payloads(Some(RecordType::Trips), &[], &pages_only())
        .await
        .unwrap();
    assert_eq!(unflattened.len(), 1);
    assert!(unflattened[0].is_array());
}

#[tokio::test]
async fn test_unflattened_payloads_drop_emptied_page_lists() {
    let files = ProviderDataFiles::new(
        Some(RecordType::StatusChanges),
        [source("status_changes_0.2.0.json"), source("trips_0.3.0.json")],
    )
    .unwrap();

    let payloads = files.load_payloads(None, &[], &pages_only()).await.unwrap();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].is_object());
    assert_eq!(payloads[0]["version"], "0.2.0");
}

#[tokio::test]
async fn test_load_without_sources_fails() {
    let files = ProviderDataFiles::new(Some(RecordType::Trips), Vec::<Source>::new()).unwrap();
    assert!(
        files
            .load_payloads(None, &[], &LoadOptions::default())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_missing_files_are_skipped() {
    let files = ProviderDataFiles::new(
        Some(RecordType::Trips),
        [source("does_not_exist.json"), source("trips_0.3.0.json")],
    )
    .unwrap();
    let records = files
        .load_records(None, &[], &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(records.record_count(), 3);
}

#[tokio::test]
async fn test_frames_reencode_across_versions() {
    let files = ProviderDataFiles::new(Some(RecordType::StatusChanges), [source("status_changes_0.2.0.json")])
        .unwrap();
    let frames = files
        .load_frames(None, &[], &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(frames.len(), 1);

    let frame = &frames[0];
    let times: Vec<&RawValue> = frame.column("event_time").unwrap().collect();
    assert!(times.iter().all(|t| matches!(t, RawValue::Timestamp(_))));

    let encoder =
        ValueEncoder::new(EncodingContext::new(Version::new(0, 3, 0), DateFormat::Unix).unwrap());
    assert_eq!(encoder.encode(times[0]).unwrap(), "1609459200000");
    assert_eq!(encoder.encode(times[1]).unwrap(), "1609462800500");

    let encoder = ValueEncoder::new(EncodingContext::for_version(Version::new(0, 2, 0)).unwrap());
    assert_eq!(encoder.encode(times[0]).unwrap(), "1609459200.0");
}

#[tokio::test]
async fn test_frames_write_csv() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("trips.csv");

    let files = ProviderDataFiles::new(Some(RecordType::Trips), [source("trips_0.3.0.json")]).unwrap();
    let frames = files
        .load_frames(None, &[], &LoadOptions::default())
        .await
        .unwrap();
    let encoder = ValueEncoder::new(
        EncodingContext::new(Version::new(0, 3, 0), DateFormat::Iso8601).unwrap(),
    );
    for frame in &frames {
        frame.append_csv(&out, &encoder).unwrap();
    }

    let content = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("provider_name,device_id"));
    assert!(lines[1].contains("2021-01-01T00:00:00Z"));
}

#[tokio::test]
async fn test_dump_single_file_with_generated_name() {
    let dir = tempfile::tempdir().unwrap();
    let files = ProviderDataFiles::new(Some(RecordType::Trips), [source("trips_0.3.0.json")]).unwrap();
    let payloads = files
        .load_payloads(None, &[], &LoadOptions::default())
        .await
        .unwrap();

    let options = DumpOptions {
        output_dir: Some(dir.path().to_path_buf()),
        ..DumpOptions::default()
    };
    let written = files.dump_payloads(None, &payloads, &options).unwrap().unwrap();

    assert_eq!(
        written.file_name().unwrap(),
        "Bird_Lime_trips_20210101T000000Z_20210101T020000Z.json"
    );
    let content: Value = serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(content.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dump_single_object_stays_an_object() {
    let dir = tempfile::tempdir().unwrap();
    let files = ProviderDataFiles::new(None, [source("status_changes_0.2.0.json")]).unwrap();
    let payloads = files
        .load_payloads(None, &[], &LoadOptions::default())
        .await
        .unwrap();

    let options = DumpOptions {
        output_dir: Some(dir.path().to_path_buf()),
        file_name: Some(FileName::Fixed("status.json".into())),
        pretty: true,
        ..DumpOptions::default()
    };
    let written = files.dump_payloads(None, &payloads, &options).unwrap().unwrap();
    assert_eq!(written, dir.path().join("status.json"));

    let content: Value = serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(content, payloads[0]);
}

#[tokio::test]
async fn test_dump_multi_file_numbers_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let files = ProviderDataFiles::new(None, [source("trips_0.3.0.json")]).unwrap();
    let payloads = files
        .load_payloads(None, &[], &pages_only())
        .await
        .unwrap();

    let options = DumpOptions {
        output_dir: Some(dir.path().to_path_buf()),
        single_file: false,
        file_name: Some(FileName::Fixed("trips.json".into())),
        pretty: false,
    };
    let written = files.dump_payloads(None, &payloads, &options).unwrap().unwrap();
    assert_eq!(written, dir.path());

    assert!(dir.path().join("trips.json").is_file());
    assert!(dir.path().join("trips_1.json").is_file());
}

#[tokio::test]
async fn test_dump_nothing_matching_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let files = ProviderDataFiles::new(None, [source("trips_0.3.0.json")]).unwrap();
    let payloads = files
        .load_payloads(None, &[], &LoadOptions::default())
        .await
        .unwrap();

    let options = DumpOptions {
        output_dir: Some(dir.path().join("out")),
        ..DumpOptions::default()
    };
    let written = files
        .dump_payloads(Some(RecordType::StatusChanges), &payloads, &options)
        .unwrap();
    assert!(written.is_none());
    assert!(!dir.path().join("out").exists());
}
