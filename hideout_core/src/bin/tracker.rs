use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use serde::Serialize;
use tracing::{debug, info, warn};

use hideout_core::{load_tracker_config_from_env, LifecycleEvent, TrackerApp, UserAction};
use hideout_runtime::{parse_command_line, CommandPayload, ResetScope, ViewKind};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (config, config_path) = load_tracker_config_from_env();
    let frame_interval = config.frame_interval();
    let mut tracker = TrackerApp::from_config(config.clone());

    info!(
        target: "hideout::tracker",
        config = ?config_path,
        storage_dir = %config.storage_dir().display(),
        snapshot_loaded = tracker.snapshot().is_some(),
        sort_mode = %tracker.sort_mode(),
        "tracker.ready"
    );

    let command_rx = spawn_command_listener();

    loop {
        match command_rx.recv_timeout(frame_interval) {
            Ok(CommandPayload::Quit) => break,
            Ok(command) => handle_command(&mut tracker, command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!(target: "hideout::tracker", "tracker.input_closed");
                break;
            }
        }
        tracker.update();
    }

    let metrics = tracker.metrics().clone();
    if tracker.shutdown(SHUTDOWN_TIMEOUT) {
        info!(
            target: "hideout::tracker",
            actions = metrics.actions_applied,
            flushes = metrics.flushes,
            "tracker.shutdown"
        );
    } else {
        warn!(target: "hideout::tracker", "tracker.shutdown_timed_out");
    }
}

fn spawn_command_listener() -> Receiver<CommandPayload> {
    let (sender, receiver) = unbounded::<CommandPayload>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(target: "hideout::tracker", error = %err, "command.read_failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command_line(&line) {
                Ok(command) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(target: "hideout::tracker", input = %line.trim(), error = %err, "command.rejected");
                }
            }
        }
    });
    receiver
}

fn handle_command(tracker: &mut TrackerApp, command: CommandPayload) {
    if command.is_edit() {
        debug!(target: "hideout::tracker", command = ?command, "command.edit");
    }
    match command {
        CommandPayload::SetOnHand { item_id, quantity } => {
            tracker.dispatch(UserAction::SetOnHand { item_id, quantity });
        }
        CommandPayload::AdjustOnHand { item_id, delta } => {
            tracker.dispatch(UserAction::AdjustOnHand { item_id, delta });
        }
        CommandPayload::SetStationLevel { station_id, level } => {
            if !tracker.set_station_level(&station_id, level) {
                warn!(target: "hideout::tracker", %station_id, "command.unknown_station");
            }
        }
        CommandPayload::Upgrade { station_id } => {
            if !tracker.upgrade(&station_id) {
                warn!(target: "hideout::tracker", %station_id, "command.upgrade_not_ready");
            }
        }
        CommandPayload::ToggleExclusion { station_id } => {
            tracker.dispatch(UserAction::ToggleStationExclusion { station_id });
        }
        CommandPayload::Reset(ResetScope::StationLevels) => {
            tracker.dispatch(UserAction::ResetStationLevels);
        }
        CommandPayload::Reset(ResetScope::OnHand) => {
            tracker.dispatch(UserAction::ResetOnHand);
        }
        CommandPayload::Sort(mode) => tracker.set_sort_mode(mode),
        CommandPayload::Show(view) => {
            // apply anything still queued so the printout reflects it
            tracker.update();
            print_view(tracker, view);
        }
        CommandPayload::Hidden => tracker.lifecycle(LifecycleEvent::Hidden),
        CommandPayload::Visible => tracker.lifecycle(LifecycleEvent::Visible),
        CommandPayload::Flush => tracker.flush(),
        CommandPayload::Quit => {}
    }
}

fn print_view(tracker: &TrackerApp, view: ViewKind) {
    if view == ViewKind::Metrics {
        print_json(tracker.metrics());
        return;
    }
    let Some(derived) = tracker.derived() else {
        warn!(target: "hideout::tracker", "view.snapshot_unavailable");
        return;
    };
    match view {
        ViewKind::Stations => print_json(&derived.station_cards),
        ViewKind::Items => print_json(&derived.item_rows),
        ViewKind::Groups => print_json(&derived.item_groups),
        ViewKind::Metrics => {}
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(target: "hideout::tracker", error = %err, "view.encode_failed"),
    }
}
