use crate::config::{SeedAlarm, SeedDevice, SeedFile, SeedRule, SeedUser};
use anyhow::Result;
use chrono::Utc;
use vigil_common::types::{Alarm, AlarmType, Device, Org, Rule, Status, User};
use vigil_storage::{Store, StorageError};

/// Rows created and skipped by [`run_seed`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub created: u32,
    pub skipped: u32,
}

impl SeedSummary {
    /// Counts an insert; a row that already exists is skipped, anything
    /// else aborts the seed.
    fn record<T>(&mut self, kind: &str, id: &str, result: vigil_storage::Result<T>) -> Result<()> {
        match result {
            Ok(_) => {
                self.created += 1;
                Ok(())
            }
            Err(StorageError::AlreadyExists { .. }) => {
                tracing::warn!(kind, id = %id, "Seed row already exists, skipping");
                self.skipped += 1;
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to seed {kind} '{id}': {e}")),
        }
    }
}

fn status(enabled: bool) -> Status {
    if enabled {
        Status::Active
    } else {
        Status::Disabled
    }
}

fn device_from_seed(d: &SeedDevice) -> Device {
    let now = Utc::now();
    Device {
        id: d.id.clone(),
        org_id: d.org_id.clone(),
        unique_id: d.unique_id.clone(),
        name: d.name.clone(),
        status: status(d.enabled),
        token: d.token.clone(),
        tags: d.tags.clone(),
        created_at: now,
        updated_at: now,
    }
}

fn rule_from_seed(r: &SeedRule) -> Rule {
    let now = Utc::now();
    Rule {
        id: r.id.clone(),
        org_id: r.org_id.clone(),
        name: r.name.clone(),
        status: status(r.enabled),
        device_tag: r.device_tag.clone(),
        attr: r.attr.clone(),
        expr: r.expr.clone(),
        created_at: now,
        updated_at: now,
    }
}

fn alarm_from_seed(a: &SeedAlarm) -> Result<Alarm> {
    let alarm_type: AlarmType = a
        .alarm_type
        .parse()
        .map_err(|e| anyhow::anyhow!("Alarm '{}': {e}", a.id))?;
    let now = Utc::now();
    Ok(Alarm {
        id: a.id.clone(),
        org_id: a.org_id.clone(),
        rule_id: a.rule_id.clone(),
        name: a.name.clone(),
        status: status(a.enabled),
        alarm_type,
        user_tags: a.user_tags.clone(),
        subject_template: a.subject_template.clone(),
        body_template: a.body_template.clone(),
        repeat_interval_secs: a.repeat_interval_secs,
        created_at: now,
        updated_at: now,
    })
}

fn user_from_seed(u: &SeedUser) -> User {
    let now = Utc::now();
    User {
        id: u.id.clone(),
        org_id: u.org_id.clone(),
        name: u.name.clone(),
        email: u.email.clone(),
        phone: u.phone.clone(),
        app_key: u.app_key.clone(),
        role: u.role.clone(),
        status: status(u.enabled),
        tags: u.tags.clone(),
        created_at: now,
        updated_at: now,
    }
}

/// Creates every row of the seed file, orgs first so later rows can
/// reference them.
pub async fn run_seed(store: &Store, seed: &SeedFile) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for o in &seed.orgs {
        let now = Utc::now();
        let org = Org {
            id: o.id.clone(),
            name: o.name.clone(),
            created_at: now,
            updated_at: now,
        };
        summary.record("org", &o.id, store.create_org(&org).await)?;
    }
    for d in &seed.devices {
        let result = store.create_device(&device_from_seed(d)).await;
        summary.record("device", &d.unique_id, result)?;
    }
    for r in &seed.rules {
        summary.record("rule", &r.id, store.create_rule(&rule_from_seed(r)).await)?;
    }
    for a in &seed.alarms {
        let alarm = alarm_from_seed(a)?;
        match store.read_rule(&a.org_id, &a.rule_id).await {
            Ok(_) => {}
            Err(StorageError::NotFound { .. }) => {
                return Err(anyhow::anyhow!(
                    "Alarm '{}' references rule '{}', which does not exist in org '{}'",
                    a.id,
                    a.rule_id,
                    a.org_id
                ));
            }
            Err(e) => return Err(e.into()),
        }
        summary.record("alarm", &a.id, store.create_alarm(&alarm).await)?;
    }
    for u in &seed.users {
        summary.record("user", &u.id, store.create_user(&user_from_seed(u)).await)?;
    }

    tracing::info!(
        created = summary.created,
        skipped = summary.skipped,
        "Seed file applied"
    );
    Ok(summary)
}

/// Row counts of one org, reported after seeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgInventory {
    pub org_id: String,
    pub name: String,
    pub devices: usize,
    pub rules: usize,
    pub alarms: usize,
    pub users: usize,
}

/// Counts every org's devices, rules, alarms and users, oldest org first.
pub async fn inventory(store: &Store) -> Result<Vec<OrgInventory>> {
    let mut out = Vec::new();
    for org in store.list_orgs().await? {
        out.push(OrgInventory {
            devices: store.list_devices(&org.id).await?.len(),
            rules: store.list_rules(&org.id).await?.len(),
            alarms: store.list_alarms(&org.id).await?.len(),
            users: store.list_users(&org.id).await?.len(),
            org_id: org.id,
            name: org.name,
        });
    }
    Ok(out)
}
