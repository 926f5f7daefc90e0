#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;

use common::{FakeLookup, MB, hash, sized_file};
use dropq_core::{
    AdmissionConfig, AdmissionGate, Candidate, CandidateKind, ContentRef, ContentResolver,
    Payload, Resolution,
};

fn resolver(lookup: FakeLookup) -> ContentResolver {
    ContentResolver::new(Arc::new(lookup))
}

fn handled(resolution: Resolution) -> Vec<Candidate> {
    match resolution {
        Resolution::Handled(candidates) => candidates,
        Resolution::NotHandled => panic!("payload was not handled"),
    }
}

fn indices(candidates: &[Candidate]) -> Vec<u32> {
    candidates
        .iter()
        .filter_map(|c| match &c.reference {
            ContentRef::ContentFile { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_small_file_dropped_from_batch_but_admitted_alone() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let video = sized_file(dir.path(), "a.mp4", 200 * MB)?;
    let notes = sized_file(dir.path(), "b.txt", 1024)?;
    let resolver = resolver(FakeLookup::default());
    let gate = AdmissionGate::new(AdmissionConfig::default());

    let both = handled(
        resolver
            .resolve(&Payload::Paths(vec![video.clone(), notes.clone()]))
            .await,
    );
    let report = gate.admit(both).await;
    assert_eq!(report.admitted.len(), 1);
    assert_eq!(
        report.admitted[0].reference,
        ContentRef::LocalFile { path: video }
    );
    assert_eq!(report.filtered, 1);

    let alone = handled(resolver.resolve(&Payload::Paths(vec![notes])).await);
    assert!(alone[0].single);
    let report = gate.admit(alone).await;
    assert_eq!(report.admitted.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_admits_n_minus_m() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let mut paths = Vec::new();
    for i in 0..5 {
        paths.push(sized_file(dir.path(), &format!("big{i}.mkv"), MB)?);
    }
    for i in 0..3 {
        paths.push(sized_file(dir.path(), &format!("small{i}.nfo"), 10)?);
    }

    let candidates = handled(resolver(FakeLookup::default()).resolve(&Payload::Paths(paths)).await);
    assert_eq!(candidates.len(), 8);

    let report = AdmissionGate::new(AdmissionConfig::default())
        .admit(candidates)
        .await;
    assert_eq!(report.admitted.len(), 5);
    assert_eq!(report.filtered, 3);
    assert_eq!(report.capped, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_paths_dropped_siblings_kept() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let real = sized_file(dir.path(), "real.mp4", MB)?;
    let ghost = dir.path().join("ghost.mp4");

    let candidates = handled(
        resolver(FakeLookup::default())
            .resolve(&Payload::Paths(vec![ghost, real.clone()]))
            .await,
    );
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].reference, ContentRef::LocalFile { path: real });
    Ok(())
}

#[tokio::test]
async fn test_directory_expansion_shares_cap() -> Result<(), Box<dyn Error>> {
    let outer = tempfile::tempdir()?;
    let loose = sized_file(outer.path(), "loose.mp4", MB)?;
    let album = outer.path().join("album");
    std::fs::create_dir(&album)?;
    for name in ["1.flac", "2.flac", "3.flac"] {
        sized_file(&album, name, MB)?;
    }
    sized_file(&album, "cover.txt", 10)?;
    std::fs::create_dir(album.join("nested"))?;
    sized_file(&album.join("nested"), "deep.flac", MB)?;

    let candidates = handled(
        resolver(FakeLookup::default())
            .resolve(&Payload::Paths(vec![loose, album.clone()]))
            .await,
    );
    assert_eq!(candidates[1].kind, CandidateKind::Directory);

    let report = AdmissionGate::new(AdmissionConfig::default())
        .admit(candidates.clone())
        .await;
    assert_eq!(report.admitted.len(), 4);
    assert_eq!(report.filtered, 1);

    // Sub-directories are not descended into.
    assert!(report.admitted.iter().all(|c| match &c.reference {
        ContentRef::LocalFile { path } => !path.starts_with(album.join("nested")),
        _ => false,
    }));

    let report = AdmissionGate::new(AdmissionConfig::default().with_max_batch_size(2))
        .admit(candidates)
        .await;
    assert_eq!(report.admitted.len(), 2);
    assert_eq!(report.capped, 2);
    Ok(())
}

#[tokio::test]
async fn test_hash_with_indices_selects_exactly_those() {
    let h = hash(7);
    let lookup = FakeLookup::default().with(h, &[("a.mp4", 10), ("b.mp4", 20), ("c.mp4", 30)]);
    let text = format!("DownloadManager\n{h};0;2\n");

    let candidates = handled(resolver(lookup).resolve(&Payload::Text(text)).await);
    assert_eq!(indices(&candidates), vec![0, 2]);
    assert!(candidates.iter().all(|c| c.single));

    // Explicit picks bypass the size filter.
    let report = AdmissionGate::new(AdmissionConfig::default())
        .admit(candidates)
        .await;
    assert_eq!(report.admitted.len(), 2);
}

#[tokio::test]
async fn test_bare_hash_selects_every_eligible_file() {
    let h = hash(9);
    let lookup = FakeLookup::default().with(
        h,
        &[("movie.mkv", 700 * MB), ("sample.mkv", 5 * MB), ("info.nfo", 2048)],
    );
    let text = format!("DiskManagerFileInfo\n{}\n", h.to_string().to_lowercase());

    let candidates = handled(resolver(lookup).resolve(&Payload::Text(text)).await);
    assert_eq!(indices(&candidates), vec![0, 1, 2]);

    let report = AdmissionGate::new(AdmissionConfig::default())
        .admit(candidates)
        .await;
    assert_eq!(indices(&report.admitted), vec![0, 1]);
}

#[tokio::test]
async fn test_tag_after_blank_lines_and_crlf() {
    let h = hash(4);
    let lookup = FakeLookup::default().with(h, &[("a.mp4", MB), ("b.mp4", MB)]);
    let text = format!("\r\n\nDownloadManager\r\n{h};1\r\n");

    let payload = Payload::infer(&text);
    assert!(matches!(payload, Payload::Text(_)));
    let candidates = handled(resolver(lookup).resolve(&payload).await);
    assert_eq!(indices(&candidates), vec![1]);
}

#[tokio::test]
async fn test_malformed_lines_skipped_others_continue() {
    let good = hash(1);
    let unknown = hash(2);
    let lookup = FakeLookup::default().with(good, &[("a.mp4", MB), ("b.mp4", MB)]);
    let text = format!(
        "DownloadManager\nnot-base32!\n{good};x\n\n{unknown}\n{good};1;99\n{good}\n"
    );

    let candidates = handled(resolver(lookup).resolve(&Payload::Text(text)).await);
    // `good;1;99` keeps index 1 and drops the unknown index; bare `good` adds both.
    assert_eq!(indices(&candidates), vec![1, 0, 1]);
}

#[tokio::test]
async fn test_url_and_unhandled_payloads() -> Result<(), Box<dyn Error>> {
    let resolver = resolver(FakeLookup::default());

    let candidates = handled(
        resolver
            .resolve(&Payload::infer("https://example.com/clip.mp4"))
            .await,
    );
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].size, None);
    assert!(matches!(candidates[0].reference, ContentRef::Remote { .. }));

    assert_eq!(
        resolver.resolve(&Payload::Text("just some words".into())).await,
        Resolution::NotHandled
    );

    // A recognised tag with nothing usable is handled, not rejected.
    assert_eq!(
        resolver
            .resolve(&Payload::Text("DownloadManager\n".into()))
            .await,
        Resolution::Handled(vec![])
    );
    Ok(())
}

#[tokio::test]
async fn test_transcode_file_block_keeps_existing_absolute_files() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let a = sized_file(dir.path(), "a.out", MB)?;
    let b = sized_file(dir.path(), "b.out", MB)?;
    let text = format!(
        "TranscodeFile\n{}\nrelative/c.out\n{}\n{}\n",
        a.display(),
        dir.path().join("gone.out").display(),
        b.display()
    );

    let candidates = handled(resolver(FakeLookup::default()).resolve(&Payload::Text(text)).await);
    assert_eq!(
        candidates
            .iter()
            .map(|c| c.reference.clone())
            .collect::<Vec<_>>(),
        vec![ContentRef::Artifact { path: a }, ContentRef::Artifact { path: b }]
    );
    Ok(())
}
