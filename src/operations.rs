//! Restaurant operations data read by the assistant tools.
//!
//! Reservations, incidents, weather alerts, the waiting list and triage
//! categories live in the same SQLite database as the knowledge base. The
//! assistant only reads them; the `insert_*` functions exist for the
//! back-office importers and for tests.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.len() != 10 {
        bail!("expected a date in YYYY-MM-DD format, got '{}'", s);
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("expected a date in YYYY-MM-DD format, got '{}'", s))
}

fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => bail!("unknown {} value: '{}'", stringify!($name), other),
                }
            }
        }
    };
}

text_enum!(
    /// Reservation lifecycle.
    ReservationStatus {
        Pending => "PENDING",
        Confirmed => "CONFIRMED",
        Seated => "SEATED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
        NoShow => "NO_SHOW",
    }
);

text_enum!(Severity {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Critical => "CRITICAL",
});

text_enum!(IncidentStatus {
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    Resolved => "RESOLVED",
    Closed => "CLOSED",
});

text_enum!(AlertStatus {
    Active => "ACTIVE",
    Monitoring => "MONITORING",
    Resolved => "RESOLVED",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub guest_name: String,
    pub guest_phone: Option<String>,
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
    pub party_size: i64,
    pub status: ReservationStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherAlert {
    pub id: String,
    pub alert_type: String,
    pub severity: Severity,
    pub description: String,
    pub forecast_date: NaiveDate,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub temperature_c: Option<f64>,
    pub action: Option<String>,
    pub status: AlertStatus,
    pub triggered_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingListEntry {
    pub id: String,
    pub guest_name: String,
    pub party_size: i64,
    pub requested_date: NaiveDate,
    pub priority: i64,
    pub notes: Option<String>,
    pub notified: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCategory {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

// ============ Row mapping ============

fn row_to_reservation(row: &SqliteRow) -> Result<Reservation> {
    Ok(Reservation {
        id: row.get("id"),
        guest_name: row.get("guest_name"),
        guest_phone: row.get("guest_phone"),
        date: parse_date(&row.get::<String, _>("date"))?,
        time: row.get("time"),
        party_size: row.get("party_size"),
        status: ReservationStatus::parse(&row.get::<String, _>("status"))?,
        notes: row.get("notes"),
    })
}

fn row_to_incident(row: &SqliteRow) -> Result<Incident> {
    Ok(Incident {
        id: row.get("id"),
        incident_type: row.get("type"),
        description: row.get("description"),
        severity: Severity::parse(&row.get::<String, _>("severity"))?,
        status: IncidentStatus::parse(&row.get::<String, _>("status"))?,
        created_at: row.get("created_at"),
    })
}

fn row_to_alert(row: &SqliteRow) -> Result<WeatherAlert> {
    Ok(WeatherAlert {
        id: row.get("id"),
        alert_type: row.get("alert_type"),
        severity: Severity::parse(&row.get::<String, _>("severity"))?,
        description: row.get("description"),
        forecast_date: parse_date(&row.get::<String, _>("forecast_date"))?,
        precipitation_mm: row.get("precipitation_mm"),
        wind_speed_kmh: row.get("wind_speed_kmh"),
        temperature_c: row.get("temperature_c"),
        action: row.get("action"),
        status: AlertStatus::parse(&row.get::<String, _>("status"))?,
        triggered_at: row.get("triggered_at"),
    })
}

fn row_to_waiting(row: &SqliteRow) -> Result<WaitingListEntry> {
    Ok(WaitingListEntry {
        id: row.get("id"),
        guest_name: row.get("guest_name"),
        party_size: row.get("party_size"),
        requested_date: parse_date(&row.get::<String, _>("requested_date"))?,
        priority: row.get("priority"),
        notes: row.get("notes"),
        notified: row.get::<i64, _>("notified") != 0,
        created_at: row.get("created_at"),
    })
}

// ============ Reads ============

/// Live reservations (not cancelled, not no-show), ordered by date then time.
///
/// `guest_name` matches case-insensitively anywhere in the stored name.
/// SQLite narrows the rows with `LIKE` on the longest ASCII run of the name
/// (see [`like_fragment`]); the full Unicode match is checked afterwards.
pub async fn find_reservations(
    pool: &SqlitePool,
    guest_name: Option<&str>,
    date: Option<NaiveDate>,
    limit: usize,
) -> Result<Vec<Reservation>> {
    let mut sql = String::from(
        "SELECT id, guest_name, guest_phone, date, time, party_size, status, notes \
         FROM reservations WHERE status NOT IN ('CANCELLED', 'NO_SHOW')",
    );
    if date.is_some() {
        sql.push_str(" AND date = ?");
    }
    let needle = guest_name.map(|n| n.trim().to_lowercase());
    let fragment = needle.as_deref().and_then(like_fragment);
    if fragment.is_some() {
        sql.push_str(" AND guest_name LIKE ?");
    }
    sql.push_str(" ORDER BY date ASC, time ASC");

    let mut query = sqlx::query(&sql);
    if let Some(d) = date {
        query = query.bind(format_date(d));
    }
    if let Some(ref fragment) = fragment {
        query = query.bind(format!("%{}%", fragment));
    }
    let rows = query.fetch_all(pool).await?;

    // SQLite's LIKE only folds ASCII case; names carry accents and ñ.
    let mut out = Vec::new();
    for row in &rows {
        let reservation = row_to_reservation(row)?;
        if let Some(ref needle) = needle {
            if !reservation.guest_name.to_lowercase().contains(needle.as_str()) {
                continue;
            }
        }
        out.push(reservation);
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

/// Longest run of ASCII letters and digits in `needle`, used as a `LIKE`
/// pattern. `None` when the name has no ASCII alphanumerics at all.
pub fn like_fragment(needle: &str) -> Option<&str> {
    needle
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|run| !run.is_empty())
        .max_by_key(|run| run.len())
}

/// Open or in-progress incidents, newest first.
pub async fn active_incidents(pool: &SqlitePool, limit: usize) -> Result<Vec<Incident>> {
    let rows = sqlx::query(
        "SELECT id, type, description, severity, status, created_at FROM incidents \
         WHERE status IN ('OPEN', 'IN_PROGRESS') ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_incident).collect()
}

/// Active or monitored weather alerts, most severe first.
pub async fn active_weather_alerts(pool: &SqlitePool, limit: usize) -> Result<Vec<WeatherAlert>> {
    let rows = sqlx::query(
        r#"
        SELECT id, alert_type, severity, description, forecast_date, precipitation_mm,
               wind_speed_kmh, temperature_c, action, status, triggered_at
        FROM weather_alerts
        WHERE status IN ('ACTIVE', 'MONITORING')
        ORDER BY CASE severity
                   WHEN 'CRITICAL' THEN 4
                   WHEN 'HIGH' THEN 3
                   WHEN 'MEDIUM' THEN 2
                   ELSE 1
                 END DESC,
                 forecast_date ASC
        LIMIT ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_alert).collect()
}

/// Un-notified waiting-list entries for `date`, highest priority first,
/// then first come first served.
pub async fn waiting_list_for(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<WaitingListEntry>> {
    let rows = sqlx::query(
        "SELECT id, guest_name, party_size, requested_date, priority, notes, notified, created_at \
         FROM waiting_list WHERE requested_date = ? AND notified = 0 \
         ORDER BY priority DESC, created_at ASC, rowid ASC",
    )
    .bind(format_date(date))
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_waiting).collect()
}

/// The default triage category: the first one created.
pub async fn default_category(pool: &SqlitePool) -> Result<Option<QueryCategory>> {
    let row = sqlx::query(
        "SELECT id, name, created_at FROM query_categories ORDER BY created_at ASC, rowid ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| QueryCategory {
        id: r.get("id"),
        name: r.get("name"),
        created_at: r.get("created_at"),
    }))
}

// ============ Writes ============

pub async fn insert_reservation(pool: &SqlitePool, r: &Reservation) -> Result<()> {
    sqlx::query(
        "INSERT INTO reservations (id, guest_name, guest_phone, date, time, party_size, status, notes, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&r.id)
    .bind(&r.guest_name)
    .bind(&r.guest_phone)
    .bind(format_date(r.date))
    .bind(&r.time)
    .bind(r.party_size)
    .bind(r.status.as_str())
    .bind(&r.notes)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_incident(pool: &SqlitePool, i: &Incident) -> Result<()> {
    sqlx::query(
        "INSERT INTO incidents (id, type, description, severity, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&i.id)
    .bind(&i.incident_type)
    .bind(&i.description)
    .bind(i.severity.as_str())
    .bind(i.status.as_str())
    .bind(i.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_weather_alert(pool: &SqlitePool, w: &WeatherAlert) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO weather_alerts (id, alert_type, severity, description, forecast_date,
                                    precipitation_mm, wind_speed_kmh, temperature_c, action,
                                    status, triggered_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&w.id)
    .bind(&w.alert_type)
    .bind(w.severity.as_str())
    .bind(&w.description)
    .bind(format_date(w.forecast_date))
    .bind(w.precipitation_mm)
    .bind(w.wind_speed_kmh)
    .bind(w.temperature_c)
    .bind(&w.action)
    .bind(w.status.as_str())
    .bind(w.triggered_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_waiting_entry(pool: &SqlitePool, e: &WaitingListEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO waiting_list (id, guest_name, party_size, requested_date, priority, notes, notified, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&e.id)
    .bind(&e.guest_name)
    .bind(e.party_size)
    .bind(format_date(e.requested_date))
    .bind(e.priority)
    .bind(&e.notes)
    .bind(e.notified as i64)
    .bind(e.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_category(pool: &SqlitePool, c: &QueryCategory) -> Result<()> {
    sqlx::query("INSERT INTO query_categories (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&c.id)
        .bind(&c.name)
        .bind(c.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_are_strict() {
        assert_eq!(
            parse_date("2026-02-17").unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()
        );
        assert!(parse_date("17/02/2026").is_err());
        assert!(parse_date("2026-2-17").is_err());
        assert!(parse_date("2026-02-30").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn like_fragment_picks_the_longest_ascii_run() {
        assert_eq!(like_fragment("maría garcía"), Some("garc"));
        assert_eq!(like_fragment("núñez"), Some("ez"));
        assert_eq!(like_fragment("lópez"), Some("pez"));
        assert_eq!(like_fragment("50%_off"), Some("off"));
        assert_eq!(like_fragment("ñó"), None);
        assert_eq!(like_fragment(""), None);
    }

    #[test]
    fn enums_round_trip_their_text() {
        assert_eq!(ReservationStatus::parse("NO_SHOW").unwrap(), ReservationStatus::NoShow);
        assert_eq!(IncidentStatus::InProgress.as_str(), "IN_PROGRESS");
        assert!(Severity::parse("low").is_err());
        assert_eq!(
            serde_json::to_value(ReservationStatus::Confirmed).unwrap(),
            serde_json::json!("CONFIRMED")
        );
    }
}
