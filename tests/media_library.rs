use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use scoreboard::config::EngineConfig;
use scoreboard::media::{self, MediaEvent, NAME, SRC};
use scoreboard::scoreboard::ScoreBoard;
use scoreboard::{GraphError, Source, Value};

fn board(dir: &Path) -> ScoreBoard {
    let config = EngineConfig {
        media_root: dir.to_path_buf(),
        ..EngineConfig::default()
    };
    ScoreBoard::new(&config).expect("board")
}

#[test]
fn file_names_are_validated() {
    assert!(media::valid_file_name("logo.png"));
    assert!(media::valid_file_name("team logo.v2.jpg"));
    assert!(!media::valid_file_name(".hidden"));
    assert!(!media::valid_file_name("scores.db"));
    assert!(!media::valid_file_name("scores.DB"));
    assert!(!media::valid_file_name("../escape.png"));
    assert!(!media::valid_file_name("dir\\file.png"));
    assert!(!media::valid_file_name(""));
}

#[test]
fn display_names_drop_the_last_extension() {
    assert_eq!(media::display_name("logo.png"), "logo");
    assert_eq!(media::display_name("archive.tar.gz"), "archive.tar");
    assert_eq!(media::display_name("README"), "README");
}

#[test]
fn prepare_creates_directories_and_loads_existing_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("images/teamlogo")).expect("mkdir");
    fs::write(dir.path().join("images/teamlogo/carolina.png"), b"png").expect("write");
    fs::write(dir.path().join("images/teamlogo/.DS_Store"), b"junk").expect("write");

    let board = board(dir.path());
    let media = board.media();
    media.prepare().expect("prepare");

    assert!(dir.path().join("custom/overlay").is_dir());
    assert!(dir.path().join("game-data/xlsx").is_dir());
    let file = media.file("images", "teamlogo", "carolina.png").expect("read").expect("file known");
    assert!(media.file("images", "teamlogo", ".DS_Store").expect("read").is_none());

    let store = board.store();
    let g = store.lock().expect("lock");
    assert_eq!(g.get(file, &NAME), Value::from("carolina"));
    assert_eq!(g.get(file, &SRC), Value::from("/images/teamlogo/carolina.png"));
    assert_eq!(g.path(file), "ScoreBoard.Media.Format(images).Type(teamlogo).File(carolina.png)");
}

#[test]
fn src_is_write_protected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let board = board(dir.path());
    let media = board.media();
    media
        .apply("videos", "fullscreen", &[MediaEvent::Created("intro.webm".into())])
        .expect("apply");
    let file = media.file("videos", "fullscreen", "intro.webm").expect("read").expect("file known");
    let mut g = board.store().lock().expect("lock");
    let result = g.set(file, &SRC, "/elsewhere", Source::External);
    assert!(matches!(result, Err(GraphError::WriteProtected { .. })), "got {:?}", result);
    assert!(g.set(file, &NAME, "Intro", Source::External).expect("rename"));
}

#[test]
fn refresh_reconciles_with_the_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let board = board(dir.path());
    let media = board.media();
    media.prepare().expect("prepare");
    let images = dir.path().join("images/fullscreen");

    fs::write(images.join("one.png"), b"1").expect("write");
    fs::write(images.join("two.png"), b"2").expect("write");
    media.refresh("images", "fullscreen").expect("refresh");
    assert!(media.file("images", "fullscreen", "one.png").expect("read").is_some());
    assert!(media.file("images", "fullscreen", "two.png").expect("read").is_some());

    fs::remove_file(images.join("one.png")).expect("delete");
    media.refresh("images", "fullscreen").expect("refresh");
    assert!(media.file("images", "fullscreen", "one.png").expect("read").is_none());
    assert!(media.file("images", "fullscreen", "two.png").expect("read").is_some());
}

#[test]
fn events_update_the_graph_and_overflow_rescans() {
    let dir = tempfile::tempdir().expect("tempdir");
    let board = board(dir.path());
    let media = board.media();
    media.prepare().expect("prepare");

    media
        .apply("custom", "view", &[MediaEvent::Created("a.html".into()), MediaEvent::Created("b.html".into())])
        .expect("created");
    media.apply("custom", "view", &[MediaEvent::Deleted("a.html".into())]).expect("deleted");
    assert!(media.file("custom", "view", "a.html").expect("read").is_none());
    assert!(media.file("custom", "view", "b.html").expect("read").is_some());

    // b.html never existed on disk, so a rescan drops it
    fs::write(dir.path().join("custom/view/c.html"), b"c").expect("write");
    media.apply("custom", "view", &[MediaEvent::Overflow]).expect("overflow");
    assert!(media.file("custom", "view", "b.html").expect("read").is_none());
    assert!(media.file("custom", "view", "c.html").expect("read").is_some());
}

#[test]
fn unknown_directories_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let board = board(dir.path());
    let media = board.media();
    media.apply("audio", "music", &[MediaEvent::Created("song.mp3".into())]).expect("apply");
    assert!(media.media_type("audio", "music").expect("read").is_none());
    assert!(!media.remove_media_file("audio", "music", "song.mp3"));
}

#[test]
fn removing_a_media_file_deletes_it_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let board = board(dir.path());
    let media = board.media();
    media.prepare().expect("prepare");
    let path = dir.path().join("images/sponsor_banner/sponsor.png");
    fs::write(&path, b"s").expect("write");
    media.refresh("images", "sponsor_banner").expect("refresh");

    assert!(media.remove_media_file("images", "sponsor_banner", "sponsor.png"));
    assert!(!path.exists());
    assert!(!media.remove_media_file("images", "sponsor_banner", "sponsor.png"));
    assert!(!media.remove_media_file("images", "sponsor_banner", "../../escape"));
    // the graph catches up on the next scan
    assert!(media.file("images", "sponsor_banner", "sponsor.png").expect("read").is_some());
    media.refresh("images", "sponsor_banner").expect("refresh");
    assert!(media.file("images", "sponsor_banner", "sponsor.png").expect("read").is_none());
}

#[test]
fn the_watcher_picks_up_new_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let board = board(dir.path());
    let media = board.media();
    media.prepare().expect("prepare");
    let watcher = media.watch(Duration::from_millis(10));
    fs::write(dir.path().join("videos/fullscreen/loop.webm"), b"v").expect("write");

    let deadline = Instant::now() + Duration::from_secs(5);
    while media.file("videos", "fullscreen", "loop.webm").expect("read").is_none() {
        assert!(Instant::now() < deadline, "watcher did not pick up the file");
        std::thread::sleep(Duration::from_millis(10));
    }
    watcher.stop();
}
