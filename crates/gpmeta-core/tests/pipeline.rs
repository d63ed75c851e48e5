use std::fs;
use std::path::Path;
use std::time::Duration;

use gpmeta_core::error::{NavError, TranscodeError};
use gpmeta_core::navigator::snapshot::{SnapshotNavigator, SnapshotSite};
use gpmeta_core::tagger::{MediaTags, Transcoder};
use gpmeta_core::{CrawlOptions, EnrichOptions};
use tempfile::tempdir;

const CAPTURE: &str = r#"{
  "items": [
    {
      "link": "https://photos.example/photo/A",
      "fields": ["Filename: VID_A.mp4", "Date taken: Jan 5, 2023", "Time taken: Thu, 9:05 PM"],
      "controls": ["Download - Shift+D", "View next photo"],
      "hrefs": ["https://maps.example/maps?q=loc:48.8584,2.2945"],
      "location_text": "Eiffel Tower\nParis, France",
      "lists": [
        {"preceding": ["Details"], "entries": ["Not an album"]},
        {"preceding": ["Albums"], "entries": ["Paris 2023\n12 items", "Family"]}
      ],
      "download": "payload/a.bin",
      "next": "https://photos.example/photo/B"
    },
    {
      "link": "https://photos.example/photo/B",
      "fields": ["Filename: VID_B.mp4", "Date taken: Jul 1, 2022"],
      "controls": ["Download - Shift+D", "View next photo"],
      "location_text": "Lyon",
      "download": "payload/b.bin",
      "next": "https://photos.example/photo/C"
    },
    {
      "link": "https://photos.example/photo/C",
      "fields": ["Filename: IMG_C.jpg", "Date taken: Jul 2, 2022"],
      "controls": ["Download - Shift+D"],
      "hrefs": ["https://maps.example/maps?q=loc:-33.86,151.2"],
      "download": "payload/c.bin"
    }
  ]
}"#;

struct StampTranscoder;

impl Transcoder for StampTranscoder {
    fn rewrite_metadata(
        &self,
        input: &Path,
        output: &Path,
        tags: &MediaTags,
    ) -> Result<(), TranscodeError> {
        let mut body = fs::read(input).map_err(|source| TranscodeError::Spawn {
            program: "stamp".into(),
            source,
        })?;
        body.extend_from_slice(format!("|{}|{}", tags.creation_time, tags.iso6709).as_bytes());
        fs::write(output, body).map_err(|source| TranscodeError::Spawn {
            program: "stamp".into(),
            source,
        })
    }
}

fn write_capture(root: &Path) -> std::path::PathBuf {
    let capture_dir = root.join("capture");
    fs::create_dir_all(capture_dir.join("payload")).unwrap();
    for name in ["a", "b", "c"] {
        fs::write(capture_dir.join(format!("payload/{name}.bin")), name.as_bytes()).unwrap();
    }
    let path = capture_dir.join("capture.json");
    fs::write(&path, CAPTURE).unwrap();
    path
}

fn crawl(options: &CrawlOptions, site: &SnapshotSite) -> gpmeta_core::CrawlReport {
    let mut sessions = || -> Result<SnapshotNavigator, NavError> { Ok(site.session()) };
    gpmeta_core::crawl(options, &mut sessions, &|_, _, _, _| {}).unwrap()
}

#[test]
fn crawl_then_tag() {
    let dir = tempdir().unwrap();
    let capture = write_capture(dir.path());
    let downloads = dir.path().join("gp_downloads");
    let ledger = dir.path().join("google_photos_videos.csv");

    let options = CrawlOptions {
        start_link: "https://photos.example/photo/A".into(),
        ledger_path: ledger.clone(),
        download_dir: downloads.clone(),
        stability_window: Duration::from_millis(30),
        poll_interval: Duration::from_millis(5),
        ..CrawlOptions::default()
    };
    let site = SnapshotSite::load(&capture, &downloads).unwrap();

    let report = crawl(&options, &site);
    assert_eq!(report.items_visited, 3);
    assert_eq!(report.items_committed, 3);
    assert!(!report.stopped_on_navigation_error);

    let text = fs::read_to_string(&ledger).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "link,filename,date,time,latitude,longitude,location,albums");
    assert_eq!(
        lines[1],
        "https://photos.example/photo/A,VID_A.mp4,2023-01-05,21:05:00,48.8584,2.2945,Eiffel Tower,Paris 2023;Family"
    );
    assert_eq!(lines[2], "https://photos.example/photo/B,VID_B.mp4,2022-07-01,,,,Lyon,");
    assert_eq!(lines.len(), 4);
    assert!(downloads.join("VID_A.mp4").exists());
    assert!(downloads.join("IMG_C.jpg").exists());

    let enrich_options = EnrichOptions {
        ledger_path: ledger.clone(),
        source_dir: downloads.clone(),
        ..EnrichOptions::default()
    };
    let report = gpmeta_core::enrich(&enrich_options, &StampTranscoder, &|_, _, _, _| {}).unwrap();
    assert_eq!(report.tagged, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("Lyon"));
    assert!(report.failed.is_empty());

    let ready = fs::canonicalize(dir.path()).unwrap().join("ready_for_upload");
    assert_eq!(report.ready_dir, ready);
    assert_eq!(
        fs::read_to_string(ready.join("VID_A.mp4")).unwrap(),
        "a|2023-01-05T21:05:00|+48.8584+2.2945/"
    );
    assert!(!downloads.join("VID_A.mp4").exists());
    assert!(downloads.join("VID_B.mp4").exists());
    assert!(downloads.join("IMG_C.jpg").exists());

    // A second crawl revisits every item but the ledger does not grow.
    let again = crawl(&options, &site);
    assert_eq!(again.items_visited, 3);
    assert_eq!(again.items_committed, 0);
    assert_eq!(again.already_committed, 3);
    assert_eq!(fs::read_to_string(&ledger).unwrap(), text);
}
