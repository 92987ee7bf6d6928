use chaathan_server::antagonist::{route_waypoint, step_toward};
use chaathan_server::constants::{
    AURA_MAX, DEFAULT_TALISMANS, INTERACTION_DISTANCE, MAP_HEIGHT, MAP_WIDTH, MAX_PLAYERS,
    RITUAL_CENTER, SALT_USE_RANGE, TICK_MS,
};
use chaathan_server::engine::{RoomSession, RoomSettings};
use chaathan_server::rng::{RandomSource, Rng};
use chaathan_server::types::{
    AgentMode, Difficulty, GameMode, GameOverReason, LampKind, LampState, Phase, PlayerView,
    Role, RoomSnapshot, ServerEvent,
};
use chaathan_server::world::distance;
use clap::Parser;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Cooperator bots walk at this speed in px/s.
const BOT_SPEED: f32 = 160.0;
const LOW_AURA: f32 = 35.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs headless Chaathan rooms driven by bots")]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    difficulty: Option<String>,
    #[arg(long)]
    minutes: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    mode: GameMode,
    difficulty: Difficulty,
    minutes: u64,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    mode: GameMode,
    difficulty: Difficulty,
    minutes: u64,
    winner: Phase,
    reason: Option<GameOverReason>,
    duration_ms: u64,
    lamps_lit: u32,
    max_ritual_progress: u64,
    ritual_disruptions: u32,
    talismans_lost: u32,
    deaths: u32,
    stuns: u32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct ScenarioRunResult {
    result: ScenarioResultLine,
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenario_count: usize,
    anomaly_count: usize,
    average_duration_ms: u64,
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Default)]
struct AnomalyLog {
    messages: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

impl AnomalyLog {
    /// Every occurrence is recorded; the summary keeps each message once.
    fn push(&mut self, tick: u64, message: String) {
        self.records.push(AnomalyRecord {
            tick,
            message: message.clone(),
        });
        if self.seen.insert(message.clone()) {
            self.messages.push(message);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_writer(io::stderr)
        .with_current_span(false)
        .init();

    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            mode = ?scenario.mode,
            difficulty = ?scenario.difficulty,
            minutes = scenario.minutes,
            "scenario started"
        );
        let run = run_scenario(&scenario);

        for anomaly in &run.anomaly_records {
            warn!(
                match_id = %match_id,
                scenario = %scenario.name,
                tick = anomaly.tick,
                message = %anomaly.message,
                "anomaly detected"
            );
        }
        has_anomaly |= !run.result.anomalies.is_empty();
        total_anomalies += run.anomaly_records.len();
        total_duration_ms += run.result.duration_ms;
        *reason_counts
            .entry(reason_key(run.result.reason))
            .or_insert(0) += 1;

        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            tick = run.finished_tick,
            winner = run.result.winner.as_str(),
            reason = %reason_key(run.result.reason),
            duration_ms = run.result.duration_ms,
            anomaly_count = run.anomaly_records.len(),
            "scenario finished"
        );

        match serde_json::to_string(&run.result) {
            Ok(line) => println!("{line}"),
            Err(err) => error!(error = %err, "failed to encode scenario result"),
        }
        scenario_results.push(run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(
                match_id = %match_id,
                path = %path.display(),
                error = %err,
                "summary write failed"
            );
            std::process::exit(2);
        }
    }

    info!(
        match_id = %match_id,
        scenario_count = summary.scenario_count,
        anomaly_count = summary.anomaly_count,
        average_duration_ms = summary.average_duration_ms,
        "run finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let settings = RoomSettings::new(scenario.mode, scenario.difficulty, scenario.minutes * 60_000);
    let mut session = RoomSession::new(
        format!("sim{:05}", scenario.seed % 100_000),
        1,
        settings,
        Box::new(Rng::new(scenario.seed)),
    );
    let mut bot_rng = Rng::new(scenario.seed.rotate_left(16) ^ 0x9e37_79b9);
    let mut anomalies = AnomalyLog::default();
    let mut result = ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        mode: scenario.mode,
        difficulty: scenario.difficulty,
        minutes: scenario.minutes,
        winner: Phase::Waiting,
        reason: None,
        duration_ms: 0,
        lamps_lit: 0,
        max_ritual_progress: 0,
        ritual_disruptions: 0,
        talismans_lost: 0,
        deaths: 0,
        stuns: 0,
        anomalies: Vec::new(),
    };

    for idx in 0..MAX_PLAYERS {
        let name = format!("Bot-{idx}");
        if let Err(err) = session.add_player(&format!("bot_{idx}"), Some(&name)) {
            anomalies.push(0, format!("bot {idx} could not join: {err}"));
        }
    }
    for idx in 0..MAX_PLAYERS {
        session.mark_ready(&format!("bot_{idx}"));
    }
    if !session.is_playing() {
        anomalies.push(0, format!("room did not start: {:?}", session.phase()));
    }
    session.drain_outbox();

    let tick_limit = scenario.minutes * 60 * 1000 / TICK_MS + 100;
    let mut tick = 0u64;
    let mut game_overs = 0;
    while session.is_playing() {
        drive_bots(&mut session, &mut bot_rng);
        session.step(TICK_MS);
        tick += 1;

        for out in session.drain_outbox() {
            match out.event {
                ServerEvent::LampUpdate { lamp } if lamp.state == LampState::Lit => {
                    result.lamps_lit += 1;
                }
                ServerEvent::RitualProgress { progress, .. } => {
                    result.max_ritual_progress = result.max_ritual_progress.max(progress);
                }
                ServerEvent::RitualDisrupted => result.ritual_disruptions += 1,
                ServerEvent::TalismanUpdate { .. } => result.talismans_lost += 1,
                ServerEvent::PlayerDied { .. } => result.deaths += 1,
                ServerEvent::ChaathanStunned { .. } => result.stuns += 1,
                ServerEvent::GameOver { winner, reason } => {
                    game_overs += 1;
                    result.winner = winner;
                    result.reason = Some(reason);
                }
                _ => {}
            }
        }

        for message in collect_snapshot_anomalies(&session.snapshot()) {
            anomalies.push(tick, message);
        }
        if tick > tick_limit {
            anomalies.push(tick, "tick safety limit exceeded".to_string());
            break;
        }
    }

    if game_overs != 1 {
        anomalies.push(tick, format!("expected one game-over, saw {game_overs}"));
    }
    if session.pending_tasks() != 0 {
        anomalies.push(
            tick,
            format!("{} tasks still scheduled after game over", session.pending_tasks()),
        );
    }
    session.step(TICK_MS);
    if !session.drain_outbox().is_empty() {
        anomalies.push(tick, "events emitted after game over".to_string());
    }

    result.duration_ms = tick * TICK_MS;
    result.anomalies = anomalies.messages;
    ScenarioRunResult {
        result,
        anomaly_records: anomalies.records,
        finished_tick: tick,
    }
}

fn drive_bots(session: &mut RoomSession, rng: &mut Rng) {
    let snapshot = session.snapshot();
    for (slot, player) in snapshot.players.iter().enumerate() {
        if !player.alive {
            continue;
        }
        match player.role {
            Some(Role::Cooperator) => drive_cooperator(session, &snapshot, slot, player),
            Some(Role::Antagonist) => drive_antagonist(session, &snapshot, player, rng),
            None => {}
        }
    }
}

fn drive_cooperator(
    session: &mut RoomSession,
    snapshot: &RoomSnapshot,
    slot: usize,
    player: &PlayerView,
) {
    let id = player.id.as_str();
    let pos = (player.x, player.y);

    session.pickup_salt(id, None);
    let hunted = snapshot.chaathans.iter().any(|agent| {
        agent.state == AgentMode::Hunt
            && agent.target_id.as_deref() == Some(id)
            && distance(pos, (agent.x, agent.y)) <= SALT_USE_RANGE
    });
    if hunted && player.salt_charges > 0 {
        session.use_salt(id);
    }

    let nearest_lamp = |wanted: LampState| {
        snapshot
            .lamps
            .iter()
            .filter(|lamp| lamp.kind == LampKind::Mini && lamp.state == wanted)
            .min_by(|a, b| {
                distance(pos, (a.x, a.y)).total_cmp(&distance(pos, (b.x, b.y)))
            })
    };

    let goal = if player.aura < LOW_AURA {
        match nearest_lamp(LampState::Lit) {
            Some(lamp) => {
                session.refuel_aura(id, lamp.id);
                (lamp.x, lamp.y)
            }
            None => RITUAL_CENTER,
        }
    } else if let Some(lamp) = nearest_lamp(LampState::Unlit) {
        if distance(pos, (lamp.x, lamp.y)) <= INTERACTION_DISTANCE {
            session.light_lamp(id, lamp.id);
        }
        (lamp.x, lamp.y)
    } else {
        match snapshot.ritual_item.as_ref() {
            Some(item) if item.carrier.is_none() && slot == first_cooperator(snapshot) => {
                session.pickup_item(id);
                (item.x, item.y)
            }
            _ => RITUAL_CENTER,
        }
    };

    walk_toward(session, snapshot, id, pos, goal);
}

fn drive_antagonist(
    session: &mut RoomSession,
    snapshot: &RoomSnapshot,
    player: &PlayerView,
    rng: &mut Rng,
) {
    let id = player.id.as_str();
    if !snapshot.lamps.is_empty() && rng.bool(0.02) {
        let lamp = &snapshot.lamps[rng.pick_index(snapshot.lamps.len())];
        if rng.bool(0.5) {
            session.flicker_lamp(id, lamp.id);
        } else {
            session.extinguish_lamp(id, lamp.id);
        }
    }
    if !snapshot.doors.is_empty() && rng.bool(0.01) {
        let door = &snapshot.doors[rng.pick_index(snapshot.doors.len())];
        session.seal_door(id, door.id);
    }
    let qualifying = &snapshot.ritual_circle.qualifying_ids;
    if !qualifying.is_empty() && rng.bool(0.05) {
        session.push_player(id, &qualifying[rng.pick_index(qualifying.len())]);
    }
    walk_toward(session, snapshot, id, (player.x, player.y), RITUAL_CENTER);
}

fn first_cooperator(snapshot: &RoomSnapshot) -> usize {
    snapshot
        .players
        .iter()
        .position(|p| p.alive && p.role == Some(Role::Cooperator))
        .unwrap_or(0)
}

fn walk_toward(
    session: &mut RoomSession,
    snapshot: &RoomSnapshot,
    id: &str,
    pos: (f32, f32),
    goal: (f32, f32),
) {
    let Some(waypoint) = route_waypoint(pos, goal, &snapshot.doors) else {
        return;
    };
    let budget = BOT_SPEED * TICK_MS as f32 / 1000.0;
    let (x, y) = step_toward(pos, waypoint, budget);
    session.move_player(id, x, y);
}

fn collect_snapshot_anomalies(snapshot: &RoomSnapshot) -> Vec<String> {
    let mut anomalies = Vec::new();
    for player in &snapshot.players {
        if !player.aura.is_finite() || player.aura < 0.0 || player.aura > AURA_MAX {
            anomalies.push(format!("aura out of range: {} {}", player.id, player.aura));
        }
        if player.talismans > DEFAULT_TALISMANS {
            anomalies.push(format!("talismans above start: {}", player.id));
        }
        if player.alive && player.talismans == 0 {
            anomalies.push(format!("alive without talismans: {}", player.id));
        }
    }

    let circle = &snapshot.ritual_circle;
    if circle.progress > circle.total {
        anomalies.push(format!("ritual progress past total: {}", circle.progress));
    }

    if let Some(carrier) = snapshot
        .ritual_item
        .as_ref()
        .and_then(|item| item.carrier.as_deref())
    {
        let held_by_living = snapshot
            .players
            .iter()
            .any(|p| p.id == carrier && p.alive && p.is_carrying_item);
        if !held_by_living {
            anomalies.push(format!("item held by invalid carrier: {carrier}"));
        }
    }

    for agent in &snapshot.chaathans {
        if !(0.0..=MAP_WIDTH).contains(&agent.x) || !(0.0..=MAP_HEIGHT).contains(&agent.y) {
            anomalies.push(format!("agent outside the map: {}", agent.id));
        }
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = cli.seed.unwrap_or_else(now_ms) as u32;
    let difficulty = cli
        .difficulty
        .as_deref()
        .and_then(Difficulty::parse)
        .unwrap_or(Difficulty::Medium);
    let mode = cli
        .mode
        .as_deref()
        .and_then(GameMode::parse)
        .unwrap_or(GameMode::Survival);

    if cli.single || cli.mode.is_some() || cli.minutes.is_some() {
        let minutes = cli.minutes.unwrap_or(3).clamp(1, 60);
        return vec![Scenario {
            name: format!("custom-{}", mode_key(mode)),
            mode,
            difficulty,
            minutes,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "survival-easy".to_string(),
            mode: GameMode::Survival,
            difficulty: Difficulty::Easy,
            minutes: 3,
            seed,
        },
        Scenario {
            name: "survival-hard".to_string(),
            mode: GameMode::Survival,
            difficulty: Difficulty::Hard,
            minutes: 3,
            seed: seed.wrapping_add(1),
        },
        Scenario {
            name: "competitive".to_string(),
            mode: GameMode::Competitive,
            difficulty: Difficulty::Medium,
            minutes: 3,
            seed: seed.wrapping_add(2),
        },
    ]
}

fn mode_key(mode: GameMode) -> &'static str {
    match mode {
        GameMode::Competitive => "competitive",
        GameMode::Survival => "survival",
    }
}

fn reason_key(reason: Option<GameOverReason>) -> String {
    match reason {
        Some(GameOverReason::Timeout) => "timeout",
        Some(GameOverReason::RitualComplete) => "ritual_complete",
        Some(GameOverReason::AllDead) => "all_dead",
        Some(GameOverReason::ChaathanLeft) => "chaathan_left",
        None => "unfinished",
    }
    .to_string()
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(reason: GameOverReason, duration_ms: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            mode: GameMode::Survival,
            difficulty: Difficulty::Medium,
            minutes: 1,
            winner: Phase::ChaathanWin,
            reason: Some(reason),
            duration_ms,
            lamps_lit: 0,
            max_ritual_progress: 0,
            ritual_disruptions: 0,
            talismans_lost: 0,
            deaths: 0,
            stuns: 0,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_duration() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(GameOverReason::Timeout, 60_000),
                make_scenario_result(GameOverReason::RitualComplete, 90_000),
            ],
            BTreeMap::from([
                ("timeout".to_string(), 1usize),
                ("ritual_complete".to_string(), 1usize),
            ]),
            1,
            150_000,
        );
        assert_eq!(summary.average_duration_ms, 75_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("chaathan-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result(GameOverReason::Timeout, 60_000)],
            BTreeMap::from([("timeout".to_string(), 1usize)]),
            0,
            60_000,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn anomaly_log_keeps_records_and_deduplicates_messages() {
        let mut log = AnomalyLog::default();
        log.push(10, "same anomaly".to_string());
        log.push(11, "same anomaly".to_string());
        assert_eq!(log.messages.len(), 1);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[1].tick, 11);
    }

    #[test]
    fn one_minute_survival_run_ends_cleanly() {
        let run = run_scenario(&Scenario {
            name: "unit".to_string(),
            mode: GameMode::Survival,
            difficulty: Difficulty::Easy,
            minutes: 1,
            seed: 7,
        });
        assert!(run.result.reason.is_some());
        assert!(run.result.winner.is_terminal());
        assert!(run.result.duration_ms <= 60_000);
    }
}
