//! Scenario runner — replays a declarative timeline against the scheduler.
//!
//! A scenario declares boundaries and a list of host events at virtual
//! millisecond offsets:
//!
//! ```toml
//! name = "article page"
//! until_ms = 600
//!
//! [host]
//! idle_supported = false
//!
//! [[boundary]]
//! id = "comments"
//! trigger = "visible"
//! threshold = 0.25
//!
//! [[step]]
//! at_ms = 100
//! action = "intersect"
//! target = "comments"
//! ratio = 0.5
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use islet_core::{InteractionEvent, IsletConfig, IsletError, Priority, Result, TriggerKind};
use islet_scheduler::{
    Boundary, BoundarySpec, EventHost, Host, RenderDecision, Scheduler, SchedulerMetrics, Trigger,
    run_realtime,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub host: ScenarioHost,
    #[serde(default, rename = "boundary")]
    pub boundaries: Vec<BoundaryDecl>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
    /// Where the clock stops. Defaults to the last step.
    #[serde(default)]
    pub until_ms: Option<u64>,
}

fn default_name() -> String {
    "scenario".into()
}

/// Host overrides; unset fields come from `[host]` in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioHost {
    pub idle_supported: Option<bool>,
    pub online: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryDecl {
    pub id: Option<String>,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub respect_connection_speed: bool,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_content")]
    pub content: String,
    #[serde(flatten)]
    pub trigger: Trigger,
}

fn default_placeholder() -> String {
    "placeholder".into()
}

fn default_content() -> String {
    "content".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Intersect { target: String, ratio: f64 },
    Dispatch { target: String, event: InteractionEvent },
    Online,
    Offline,
    Idle,
    Publish { target: String },
    Teardown { target: String },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IsletError::Scenario(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: toml::Table = toml::from_str(content)
            .map_err(|e| IsletError::Scenario(format!("Failed to parse scenario: {e}")))?;
        check_keys(&raw)?;
        let scenario: Self = toml::from_str(content)
            .map_err(|e| IsletError::Scenario(format!("Failed to parse scenario: {e}")))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        let last = self.steps.iter().map(|s| s.at_ms).max().unwrap_or(0);
        if let Some(until) = self.until_ms
            && until < last
        {
            return Err(IsletError::Scenario(format!(
                "until_ms ({until}) is before the last step ({last})"
            )));
        }
        for step in &self.steps {
            if let Action::Intersect { target, ratio } = &step.action
                && (!ratio.is_finite() || !(0.0..=1.0).contains(ratio))
            {
                return Err(IsletError::Scenario(format!(
                    "intersect ratio for '{target}' at {}ms must be within [0, 1]",
                    step.at_ms
                )));
            }
        }
        Ok(())
    }

    pub fn end_ms(&self) -> u64 {
        let last = self.steps.iter().map(|s| s.at_ms).max().unwrap_or(0);
        self.until_ms.unwrap_or(last)
    }

    /// Steps in time order; same-time steps keep file order.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.at_ms);
        steps
    }
}

const SCENARIO_KEYS: &[&str] = &["name", "host", "boundary", "step", "until_ms"];
const HOST_KEYS: &[&str] = &["idle_supported", "online"];
const STEP_KEYS: &[&str] = &["at_ms", "action"];
const BOUNDARY_KEYS: &[&str] = &[
    "id",
    "priority",
    "respect_connection_speed",
    "placeholder",
    "content",
    "trigger",
];

/// Settings each trigger accepts on top of the common boundary keys.
fn trigger_keys(trigger: &str) -> Option<&'static [&'static str]> {
    match trigger {
        "immediate" | "manual" => Some(&[]),
        "visible" => Some(&["threshold", "margin_px"]),
        "interaction" => Some(&["events"]),
        "idle" => Some(&["timeout_ms"]),
        _ => None,
    }
}

/// Fields each step action takes besides `at_ms` and `action`.
fn action_keys(action: &str) -> Option<&'static [&'static str]> {
    match action {
        "intersect" => Some(&["target", "ratio"]),
        "dispatch" => Some(&["target", "event"]),
        "publish" | "teardown" => Some(&["target"]),
        "online" | "offline" | "idle" => Some(&[]),
        _ => None,
    }
}

/// Flattened tables can't use `deny_unknown_fields`; check keys by hand.
fn check_keys(raw: &toml::Table) -> Result<()> {
    reject_unknown(raw, &[SCENARIO_KEYS], "scenario")?;
    if let Some(toml::Value::Table(host)) = raw.get("host") {
        reject_unknown(host, &[HOST_KEYS], "[host]")?;
    }
    for (i, table) in tables(raw, "boundary").enumerate() {
        // Unknown or missing trigger names are reported by serde.
        if let Some(extra) = table
            .get("trigger")
            .and_then(toml::Value::as_str)
            .and_then(trigger_keys)
        {
            reject_unknown(table, &[BOUNDARY_KEYS, extra], &format!("boundary #{}", i + 1))?;
        }
    }
    for (i, table) in tables(raw, "step").enumerate() {
        if let Some(extra) = table
            .get("action")
            .and_then(toml::Value::as_str)
            .and_then(action_keys)
        {
            reject_unknown(table, &[STEP_KEYS, extra], &format!("step #{}", i + 1))?;
        }
    }
    Ok(())
}

fn tables<'a>(raw: &'a toml::Table, key: &str) -> impl Iterator<Item = &'a toml::Table> {
    raw.get(key)
        .and_then(toml::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(toml::Value::as_table)
}

fn reject_unknown(table: &toml::Table, allowed: &[&[&str]], context: &str) -> Result<()> {
    match table
        .keys()
        .find(|key| !allowed.iter().any(|set| set.contains(&key.as_str())))
    {
        Some(key) => Err(IsletError::Scenario(format!("unknown key '{key}' in {context}"))),
        None => Ok(()),
    }
}

/// How the clock moves between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Jump straight to each step.
    Virtual,
    /// Follow wall time, ticking at the given interval.
    Realtime(Duration),
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivationRecord {
    pub id: String,
    pub trigger: TriggerKind,
    pub priority: Priority,
    pub at_ms: u64,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoundaryReport {
    pub id: String,
    pub trigger: TriggerKind,
    pub priority: Priority,
    pub state: &'static str,
    pub render: Option<RenderDecision>,
    pub rendering: Option<String>,
    pub deferred: bool,
    pub activation_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub ended_at_ms: u64,
    pub boundaries: Vec<BoundaryReport>,
    pub activations: Vec<ActivationRecord>,
    pub metrics: SchedulerMetrics,
    pub signals_published: u64,
    pub signals_dropped: u64,
}

struct Declared {
    id: String,
    trigger: TriggerKind,
    priority: Priority,
}

/// Register the scenario's boundaries, replay its steps and report.
pub async fn run(scenario: &Scenario, config: &IsletConfig, pace: Pace) -> Result<ScenarioReport> {
    let host = EventHost::new(
        scenario
            .host
            .idle_supported
            .unwrap_or(config.host.idle_supported),
        scenario.host.online.unwrap_or(config.host.start_online),
    );
    let scheduler = Scheduler::from_config(config, Rc::new(host.clone()));
    let records: Rc<RefCell<Vec<ActivationRecord>>> = Rc::new(RefCell::new(Vec::new()));

    tracing::info!(
        "🎬 Scenario '{}': {} boundaries, {} steps, until {}ms",
        scenario.name,
        scenario.boundaries.len(),
        scenario.steps.len(),
        scenario.end_ms()
    );

    let mut declared = Vec::with_capacity(scenario.boundaries.len());
    let mut live: BTreeMap<String, Boundary<String>> = BTreeMap::new();
    for decl in &scenario.boundaries {
        let boundary = scheduler.register(spec_for(decl, &host, &records))?;
        declared.push(Declared {
            id: boundary.id().to_string(),
            trigger: boundary.trigger(),
            priority: boundary.priority(),
        });
        live.insert(boundary.id().to_string(), boundary);
    }

    for step in scenario.ordered_steps() {
        advance_to(&host, Duration::from_millis(step.at_ms), pace).await;
        apply(&host, &scheduler, &mut live, &step.action);
    }
    advance_to(&host, Duration::from_millis(scenario.end_ms()), pace).await;

    let boundaries = declared
        .iter()
        .map(|d| match live.get(&d.id) {
            Some(b) => {
                let status = b.status();
                BoundaryReport {
                    id: d.id.clone(),
                    trigger: d.trigger,
                    priority: d.priority,
                    state: if status.is_active {
                        "active"
                    } else if status.is_activating {
                        "activating"
                    } else {
                        "dormant"
                    },
                    render: Some(b.render_decision()),
                    rendering: Some(b.render().clone()),
                    deferred: b.deferred(),
                    activation_ms: b.activation_elapsed().map(millis),
                }
            }
            None => BoundaryReport {
                id: d.id.clone(),
                trigger: d.trigger,
                priority: d.priority,
                state: "torn-down",
                render: None,
                rendering: None,
                deferred: false,
                activation_ms: None,
            },
        })
        .collect();

    let metrics = scheduler.metrics();
    let (signals_published, signals_dropped) = scheduler.channel().publish_stats();
    let activations = records.borrow().clone();

    Ok(ScenarioReport {
        name: scenario.name.clone(),
        ended_at_ms: host.now().as_millis() as u64,
        boundaries,
        activations,
        metrics,
        signals_published,
        signals_dropped,
    })
}

fn spec_for(
    decl: &BoundaryDecl,
    host: &EventHost,
    records: &Rc<RefCell<Vec<ActivationRecord>>>,
) -> BoundarySpec<String> {
    let mut spec = BoundarySpec::new(
        decl.trigger.clone(),
        decl.placeholder.clone(),
        decl.content.clone(),
    )
    .respect_connection_speed(decl.respect_connection_speed);
    if let Some(id) = &decl.id {
        spec = spec.id(id.clone());
    }
    if let Some(priority) = decl.priority {
        spec = spec.priority(priority);
    }

    let records = records.clone();
    let clock = host.clone();
    spec.on_activated(move |activation| {
        records.borrow_mut().push(ActivationRecord {
            id: activation.id.clone(),
            trigger: activation.trigger,
            priority: activation.priority,
            at_ms: clock.now().as_millis() as u64,
            elapsed_ms: millis(activation.elapsed),
        });
    })
}

async fn advance_to(host: &EventHost, at: Duration, pace: Pace) {
    let now = host.now();
    if at <= now {
        return;
    }
    match pace {
        Pace::Virtual => host.advance(at - now),
        Pace::Realtime(tick) => {
            run_realtime(host, tick, || host.now() >= at).await;
        }
    }
}

fn apply(
    host: &EventHost,
    scheduler: &Scheduler,
    live: &mut BTreeMap<String, Boundary<String>>,
    action: &Action,
) {
    tracing::debug!("▶️  t={}ms {:?}", host.now().as_millis(), action);
    match action {
        Action::Intersect { target, ratio } => host.intersect(target, *ratio),
        Action::Dispatch { target, event } => host.dispatch(target, *event),
        Action::Online => host.set_online(true),
        Action::Offline => host.set_online(false),
        Action::Idle => {
            let granted = host.run_idle();
            tracing::debug!("💤 Idle period granted to {granted} request(s)");
        }
        Action::Publish { target } => scheduler.publish(target),
        Action::Teardown { target } => match live.remove(target) {
            Some(boundary) => boundary.teardown(),
            None => tracing::warn!("Teardown of unknown boundary '{target}' ignored"),
        },
    }
}

fn millis(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
name = "article"
until_ms = 600

[host]
idle_supported = false
online = true

[[boundary]]
id = "hero"
priority = "critical"
trigger = "immediate"

[[boundary]]
id = "comments"
trigger = "visible"
threshold = 0.25

[[boundary]]
id = "menu"
trigger = "interaction"
events = ["focus"]

[[boundary]]
id = "related"
trigger = "idle"
timeout_ms = 500

[[boundary]]
id = "chat"
trigger = "manual"
respect_connection_speed = true
placeholder = "chat offline"
content = "chat widget"

[[step]]
at_ms = 100
action = "intersect"
target = "comments"
ratio = 0.5

[[step]]
at_ms = 400
action = "offline"

[[step]]
at_ms = 200
action = "dispatch"
target = "menu"
event = "focus"

[[step]]
at_ms = 300
action = "publish"
target = "chat"
"#;

    fn find<'a>(report: &'a ScenarioReport, id: &str) -> &'a BoundaryReport {
        report.boundaries.iter().find(|b| b.id == id).unwrap()
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml(ARTICLE).unwrap();
        assert_eq!(scenario.name, "article");
        assert_eq!(scenario.boundaries.len(), 5);
        assert_eq!(scenario.boundaries[1].trigger, Trigger::Visible {
            threshold: Some(0.25),
            margin_px: None,
        });
        assert_eq!(scenario.boundaries[4].content, "chat widget");
        let order: Vec<u64> = scenario.ordered_steps().iter().map(|s| s.at_ms).collect();
        assert_eq!(order, vec![100, 200, 300, 400]);
        assert_eq!(scenario.end_ms(), 600);
    }

    #[test]
    fn test_until_before_last_step_rejected() {
        let err = Scenario::from_toml(
            "until_ms = 50\n[[step]]\nat_ms = 100\naction = \"online\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, IsletError::Scenario(_)));
    }

    #[test]
    fn test_misspelled_trigger_setting_rejected() {
        let err = Scenario::from_toml(
            "[[boundary]]\nid = \"lazy\"\ntrigger = \"idle\"\ntimeout = 500\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown key 'timeout' in boundary #1"));

        let err = Scenario::from_toml(
            "[[boundary]]\ntrigger = \"visible\"\nthreshhold = 0.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("'threshhold'"));

        // Valid for another trigger, not for this one.
        assert!(Scenario::from_toml("[[boundary]]\ntrigger = \"manual\"\nevents = [\"focus\"]\n").is_err());
    }

    #[test]
    fn test_misplaced_step_field_rejected() {
        let err = Scenario::from_toml(
            "[[step]]\nat_ms = 5\naction = \"publish\"\ntarget = \"chat\"\nratio = 3\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown key 'ratio' in step #1"));

        let err = Scenario::from_toml("untill_ms = 10\n").unwrap_err();
        assert!(matches!(err, IsletError::Scenario(_)));
        assert!(Scenario::from_toml("[host]\nidle = false\n").is_err());
    }

    #[test]
    fn test_bad_ratio_rejected() {
        let err = Scenario::from_toml(
            "[[step]]\nat_ms = 1\naction = \"intersect\"\ntarget = \"a\"\nratio = 1.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("[0, 1]"));
    }

    #[tokio::test]
    async fn test_run_virtual() {
        let scenario = Scenario::from_toml(ARTICLE).unwrap();
        let report = run(&scenario, &IsletConfig::default(), Pace::Virtual)
            .await
            .unwrap();

        assert_eq!(report.ended_at_ms, 600);
        assert_eq!(find(&report, "hero").activation_ms, Some(0.0));
        assert_eq!(find(&report, "comments").activation_ms, Some(100.0));
        assert_eq!(find(&report, "menu").activation_ms, Some(200.0));
        assert_eq!(find(&report, "related").activation_ms, Some(500.0));

        let chat = find(&report, "chat");
        assert_eq!(chat.state, "active");
        assert!(chat.deferred);
        assert_eq!(chat.render, Some(RenderDecision::Placeholder));
        assert_eq!(chat.rendering.as_deref(), Some("chat offline"));

        let order: Vec<&str> = report.activations.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(order, vec!["hero", "comments", "menu", "chat", "related"]);
        assert_eq!(report.metrics.total, 5);
        assert_eq!(report.metrics.active, 5);
        assert_eq!(report.metrics.deferred, 1);
        assert_eq!(report.signals_published, 1);
        assert_eq!(report.signals_dropped, 0);
    }

    #[tokio::test]
    async fn test_teardown_drops_later_signal() {
        let scenario = Scenario::from_toml(
            r#"
[[boundary]]
id = "chat"
trigger = "manual"

[[step]]
at_ms = 10
action = "teardown"
target = "chat"

[[step]]
at_ms = 20
action = "publish"
target = "chat"
"#,
        )
        .unwrap();
        let report = run(&scenario, &IsletConfig::default(), Pace::Virtual)
            .await
            .unwrap();
        assert_eq!(find(&report, "chat").state, "torn-down");
        assert!(report.activations.is_empty());
        assert_eq!(report.metrics.total, 0);
        assert_eq!(report.signals_dropped, 1);
    }

    #[tokio::test]
    async fn test_normal_immediate_reports_activating() {
        let scenario = Scenario::from_toml(
            "until_ms = 100\n[[boundary]]\nid = \"feed\"\ntrigger = \"immediate\"\n",
        )
        .unwrap();
        let report = run(&scenario, &IsletConfig::default(), Pace::Virtual)
            .await
            .unwrap();
        assert_eq!(find(&report, "feed").state, "activating");
        assert_eq!(report.metrics.active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_realtime() {
        let scenario = Scenario::from_toml(
            r#"
until_ms = 200

[host]
idle_supported = false

[[boundary]]
id = "lazy"
trigger = "idle"
timeout_ms = 120
"#,
        )
        .unwrap();
        let report = run(
            &scenario,
            &IsletConfig::default(),
            Pace::Realtime(Duration::from_millis(16)),
        )
        .await
        .unwrap();
        assert!(report.ended_at_ms >= 200);
        assert_eq!(find(&report, "lazy").state, "active");
        assert_eq!(report.activations[0].at_ms, 120);
    }
}
