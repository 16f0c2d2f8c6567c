//! Replays synthetic frames through a whole session: pipeline, shot list,
//! mini-game and delivery to a local stand-in for the simulator.

use image::{GrayImage, Rgba, RgbaImage};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use blm_recorder::config::{ConsistencyConfig, SimulatorConfig};
use blm_recorder::minigame::{GameType, MiniGameConfig, MiniGameEvent, ShotFormat};
use blm_recorder::pipeline::{
    create_frame_queue, run_capture, run_pipeline_worker, BoundingBoxGeometry,
    DirectoryFrameSource, Overflow, PipelineSettings, ScreenPipeline,
};
use blm_recorder::screen::{Channel, FieldExtractor, FieldLayout, TextRecognizer};
use blm_recorder::shots::ShotTable;
use blm_recorder::simulator::{
    create_delivery_queue, ConnectionState, DeliveryWorker, OutboundShot, SimulatorLink,
};
use blm_recorder::{EventHub, Session};

const BLANK: u8 = 10;
const MODE: u8 = 200;

/// Gray levels standing in for what each strip of the screen shows.
const CODES: [(u8, &str); 6] = [
    (60, "145"),
    (70, "102"),
    (80, "150"),
    (90, "88"),
    (120, "101.5"),
    (MODE, "Ball Data"),
];

struct GrayCodeRecognizer;

impl TextRecognizer for GrayCodeRecognizer {
    fn recognize_text(
        &self,
        sub_image: &GrayImage,
        _vocabulary: Option<&[String]>,
    ) -> anyhow::Result<String> {
        let level = sub_image.get_pixel(0, 0)[0];
        let text = CODES
            .iter()
            .find(|(code, _)| code.abs_diff(level) <= 2)
            .map_or("", |(_, text)| *text);
        Ok(text.to_string())
    }
}

/// Strips of 10 columns: ball speed, carry, club speed, screen mode.
fn frame(speed: u8, carry: u8, club: u8) -> RgbaImage {
    RgbaImage::from_fn(40, 10, |x, _| {
        let v = [speed, carry, club, MODE][(x / 10) as usize];
        Rgba([v, v, v, 255])
    })
}

fn layout(channel: Channel, fields: &[(&str, f32)]) -> FieldLayout {
    let regions: Vec<String> = fields
        .iter()
        .map(|(name, x)| format!(r#"{{ "name": "{}", "rect": [{}, 0.0, 0.2, 1.0] }}"#, name, x))
        .collect();
    FieldLayout::from_json_str(channel, &format!("[{}]", regions.join(","))).unwrap()
}

fn pipeline() -> ScreenPipeline {
    let extractor = FieldExtractor::new(Box::new(GrayCodeRecognizer), None).unwrap();
    let settings = PipelineSettings {
        consistency: ConsistencyConfig::default(),
        redetect_after_blank_cycles: 0,
    };
    let mut pipeline =
        ScreenPipeline::new(extractor, Box::new(BoundingBoxGeometry::full_frame()), settings);
    pipeline.set_layout(layout(
        Channel::Ball,
        &[("Speed", 0.0), ("CarryDistance", 0.25)],
    ));
    pipeline.set_layout(layout(Channel::Club, &[("Speed", 0.5)]));
    pipeline.set_layout(layout(Channel::Screen, &[("mode", 0.75)]));
    pipeline
}

/// Accepts one connection, answers every line and forwards it to the test.
fn spawn_simulator() -> (u16, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (lines, received) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            let _ = writer.write_all(b"{\"Code\": 200, \"Message\": \"Shot received\"}\n");
            if lines.send(line).is_err() {
                break;
            }
        }
    });
    (port, received)
}

fn wait_for_connected(states: &Receiver<ConnectionState>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(ConnectionState::Connected) = states.recv_timeout(Duration::from_millis(100)) {
            return;
        }
    }
    panic!("simulator link never connected");
}

#[test]
fn test_replayed_session_scores_and_delivers_shots() {
    let frames_dir = tempdir().unwrap();
    let feed = [
        frame(BLANK, BLANK, BLANK),
        frame(BLANK, BLANK, BLANK),
        // first shot: ball data, then club data
        frame(60, 70, BLANK),
        frame(60, 70, BLANK),
        frame(60, 70, BLANK),
        frame(BLANK, BLANK, 120),
        frame(BLANK, BLANK, 120),
        // second shot, no club data
        frame(80, 90, BLANK),
        frame(80, 90, BLANK),
        frame(80, 90, BLANK),
        frame(BLANK, BLANK, BLANK),
    ];
    for (i, image) in feed.iter().enumerate() {
        image
            .save(frames_dir.path().join(format!("frame_{:03}.png", i)))
            .unwrap();
    }

    let (port, simulator_lines) = spawn_simulator();
    let hub = Arc::new(EventHub::new());
    let corners = hub.corners.subscribe();
    let game_events = hub.minigame.subscribe();
    let states = hub.connection.subscribe();

    let link = Arc::new(SimulatorLink::new(
        SimulatorConfig {
            ip: "127.0.0.1".to_string(),
            port,
            ..SimulatorConfig::default()
        },
        Arc::clone(&hub.connection),
    ));
    assert!(link.connect_configured());
    wait_for_connected(&states);

    let delivery = DeliveryWorker::spawn(Arc::clone(&link));
    let mut session = Session::new(Arc::clone(&hub));
    session.attach_delivery(delivery.queue());
    session
        .start_minigame(MiniGameConfig::new(
            GameType::Swings,
            100,
            100,
            ShotFormat::Incremental,
            2,
        ))
        .unwrap();

    let source = DirectoryFrameSource::open(frames_dir.path()).unwrap();
    let (sender, receiver) = create_frame_queue(2, Overflow::Block);
    let stop = AtomicBool::new(false);
    let mut pipeline = pipeline();

    let (capture, worker) = thread::scope(|scope| {
        let capture = scope.spawn(|| run_capture(source, sender, Duration::ZERO, &stop));
        let worker =
            run_pipeline_worker(receiver, &mut pipeline, |event| session.handle_event(event));
        (capture.join().unwrap(), worker)
    });
    assert_eq!(capture.captured, feed.len() as u64);
    assert_eq!(capture.dropped, 0);
    assert_eq!(worker.frames, feed.len() as u64);
    assert_eq!(worker.errors, 0);

    session.detach_delivery();
    let stats = delivery.shutdown();
    assert_eq!(stats.sent, 3);
    assert_eq!(stats.failed, 0);

    // shots
    assert_eq!(corners.try_iter().count(), 1);
    let shots = session.snapshot();
    assert_eq!(shots.len(), 2);
    assert_eq!(shots[0].ball.speed, Some(145.0));
    assert_eq!(shots[0].ball.carry_distance, Some(102.0));
    assert_eq!(shots[0].club.as_ref().unwrap().speed, Some(101.5));
    assert_eq!(shots[1].ball.carry_distance, Some(88.0));
    assert!(shots[1].club.is_none());

    // mini-game: 2 yards off scores 2, 12 yards off scores 4
    let game = session.minigame().unwrap();
    assert!(game.is_finished());
    assert_eq!(game.total_score(), 6);
    assert_eq!(game.total_to_par(), 0);
    let game_events: Vec<MiniGameEvent> = game_events.try_iter().collect();
    assert!(matches!(
        game_events.last(),
        Some(MiniGameEvent::Ended { early: false, .. })
    ));

    // simulator: heartbeat, shot 1, its club data, shot 2
    let received: Vec<Value> = (0..4)
        .map(|_| {
            let line = simulator_lines
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
            serde_json::from_str(&line).unwrap()
        })
        .collect();
    assert_eq!(received[0]["ShotDataOptions"]["IsHeartBeat"], true);
    assert_eq!(received[1]["ShotNumber"], 1);
    assert_eq!(received[1]["BallData"]["Speed"], 145.0);
    assert_eq!(received[1]["BallData"]["CarryDistance"], 102.0);
    assert!(received[1].get("ClubData").is_none());
    assert_eq!(received[2]["ShotNumber"], 1);
    assert_eq!(received[2]["ClubData"]["Speed"], 101.5);
    assert!(received[2].get("BallData").is_none());
    assert_eq!(received[3]["ShotNumber"], 2);
    assert_eq!(received[3]["BallData"]["CarryDistance"], 88.0);

    link.disconnect();
    assert_eq!(link.state(), ConnectionState::Disconnected);

    // export round trip keeps the raw text
    let export_dir = tempdir().unwrap();
    let path = session.export_csv(export_dir.path()).unwrap();
    let table = ShotTable::read_csv(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.value(0, "club.Speed"), Some("101.5"));
    assert_eq!(table.value(1, "ball.Speed"), Some("150"));
    assert_eq!(table.value(1, "club.Speed"), None);
}

#[test]
fn test_shot_held_on_screen_is_recorded_once() {
    let mut pipeline = pipeline();
    let (queue, queued) = create_delivery_queue();
    let mut session = Session::new(Arc::new(EventHub::new()));
    session.attach_delivery(queue);
    session
        .start_minigame(MiniGameConfig::new(
            GameType::Swings,
            100,
            100,
            ShotFormat::Incremental,
            5,
        ))
        .unwrap();

    let held = frame(60, 70, 120);
    for _ in 0..12 {
        for event in pipeline.process_frame(&held).unwrap() {
            session.handle_event(event);
        }
    }

    let shots = session.snapshot();
    assert_eq!(shots.len(), 1);
    assert_eq!(shots[0].club.as_ref().unwrap().speed, Some(101.5));
    assert_eq!(session.minigame().unwrap().state().shots_taken, 1);

    let queued: Vec<OutboundShot> = queued.try_iter().collect();
    assert!(queued.iter().all(|shot| shot.shot_number == 1));
    assert_eq!(queued.iter().filter(|shot| shot.ball.is_some()).count(), 1);
    assert_eq!(queued.iter().filter(|shot| shot.club.is_some()).count(), 1);
}
