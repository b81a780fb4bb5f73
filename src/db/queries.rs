use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingDraft, BookingStatus, Channel, ChannelIdentity, Conversation,
    ConversationLearningRecord, ConversationMessage, Customer, CustomerMemory, DraftStep,
    EmotionalTone, Escalation, EscalationStatus, EscalationType, FaqEntry, FaqEntryStatus, Intent,
    Package, PackageType, RelationshipStage, SessionNote, TurnOutcome,
};

const TS: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn now_ts() -> String {
    fmt_ts(&Utc::now().naive_utc())
}

// ── Customers ──

pub fn resolve_customer(
    conn: &Connection,
    channel: Channel,
    external_id: &str,
    display_name: Option<&str>,
) -> anyhow::Result<Customer> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT customer_id FROM customer_channels WHERE channel = ?1 AND external_id = ?2",
            params![channel.as_str(), external_id],
            |row| row.get(0),
        )
        .optional()?;

    let customer_id = match existing {
        Some(id) => id,
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let now = now_ts();
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO customers (id, display_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![id, display_name, now],
            )?;
            tx.execute(
                "INSERT INTO customer_channels (channel, external_id, customer_id) VALUES (?1, ?2, ?3)",
                params![channel.as_str(), external_id, id],
            )?;
            save_memory_tx(&tx, &CustomerMemory::new(&id))?;
            tx.commit()?;
            tracing::info!(customer = %id, channel = channel.as_str(), "created customer");
            id
        }
    };

    get_customer(conn, &customer_id)?
        .ok_or_else(|| anyhow::anyhow!("customer {customer_id} vanished after resolve"))
}

pub fn link_channel(
    conn: &Connection,
    customer_id: &str,
    channel: Channel,
    external_id: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO customer_channels (channel, external_id, customer_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(channel, external_id) DO UPDATE SET customer_id = excluded.customer_id",
        params![channel.as_str(), external_id, customer_id],
    )?;
    Ok(())
}

pub fn get_customer(conn: &Connection, id: &str) -> anyhow::Result<Option<Customer>> {
    let row = conn
        .query_row(
            "SELECT id, display_name, ai_enabled, paused, active, prompt_tokens, completion_tokens, created_at, updated_at
             FROM customers WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i32>(2)? != 0,
                    row.get::<_, i32>(3)? != 0,
                    row.get::<_, i32>(4)? != 0,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((id, display_name, ai_enabled, paused, active, prompt_tokens, completion_tokens, created_at, updated_at)) = row
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT channel, external_id FROM customer_channels WHERE customer_id = ?1 ORDER BY created_at ASC",
    )?;
    let identities = stmt
        .query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter_map(|(channel, external_id)| {
            Channel::parse(&channel).map(|channel| ChannelIdentity {
                channel,
                external_id,
            })
        })
        .collect();

    Ok(Some(Customer {
        id,
        display_name,
        identities,
        ai_enabled,
        paused,
        active,
        prompt_tokens,
        completion_tokens,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    }))
}

pub fn list_customers(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Customer>> {
    let mut stmt = conn.prepare("SELECT id FROM customers ORDER BY updated_at DESC LIMIT ?1")?;
    let ids = stmt
        .query_map(params![limit], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut customers = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(c) = get_customer(conn, &id)? {
            customers.push(c);
        }
    }
    Ok(customers)
}

pub struct CustomerFlags {
    pub ai_enabled: Option<bool>,
    pub paused: Option<bool>,
    pub active: Option<bool>,
}

pub fn update_customer_flags(
    conn: &Connection,
    id: &str,
    flags: &CustomerFlags,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE customers SET
           ai_enabled = COALESCE(?2, ai_enabled),
           paused = COALESCE(?3, paused),
           active = COALESCE(?4, active),
           updated_at = ?5
         WHERE id = ?1",
        params![
            id,
            flags.ai_enabled.map(i32::from),
            flags.paused.map(i32::from),
            flags.active.map(i32::from),
            now_ts()
        ],
    )?;
    Ok(count > 0)
}

pub fn add_token_usage(
    conn: &Connection,
    id: &str,
    prompt_tokens: i64,
    completion_tokens: i64,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE customers SET prompt_tokens = prompt_tokens + ?2, completion_tokens = completion_tokens + ?3, updated_at = ?4
         WHERE id = ?1",
        params![id, prompt_tokens, completion_tokens, now_ts()],
    )?;
    Ok(())
}

pub fn touch_customer(conn: &Connection, id: &str, display_name: Option<&str>) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE customers SET display_name = COALESCE(?2, display_name), updated_at = ?3 WHERE id = ?1",
        params![id, display_name, now_ts()],
    )?;
    Ok(())
}

// ── Customer Memory ──

pub fn get_memory(conn: &Connection, customer_id: &str) -> anyhow::Result<Option<CustomerMemory>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM customer_memory WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn save_memory(conn: &Connection, memory: &CustomerMemory) -> anyhow::Result<()> {
    save_memory_tx(conn, memory)
}

fn save_memory_tx(conn: &Connection, memory: &CustomerMemory) -> anyhow::Result<()> {
    let data = serde_json::to_string(memory)?;
    conn.execute(
        "INSERT INTO customer_memory (customer_id, stage, lifetime_value, data, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(customer_id) DO UPDATE SET
           stage = excluded.stage,
           lifetime_value = excluded.lifetime_value,
           data = excluded.data,
           updated_at = excluded.updated_at",
        params![
            memory.customer_id,
            memory.stage.as_str(),
            memory.lifetime_value,
            data,
            now_ts()
        ],
    )?;
    Ok(())
}

pub fn list_memories(conn: &Connection) -> anyhow::Result<Vec<CustomerMemory>> {
    let mut stmt = conn.prepare("SELECT data FROM customer_memory ORDER BY customer_id")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut memories = Vec::with_capacity(rows.len());
    for json in rows {
        memories.push(serde_json::from_str(&json)?);
    }
    Ok(memories)
}

pub fn count_by_stage(conn: &Connection, stage: RelationshipStage) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM customer_memory WHERE stage = ?1",
        params![stage.as_str()],
        |row| row.get(0),
    )?)
}

// ── Packages ──

pub fn list_packages(conn: &Connection) -> anyhow::Result<Vec<Package>> {
    let mut stmt = conn.prepare(
        "SELECT name, package_type, price, deposit, duration, features, notes FROM packages ORDER BY price ASC, name ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut packages = vec![];
    for row in rows {
        let (name, package_type, price, deposit, duration, features, notes) = row?;
        packages.push(Package {
            name,
            package_type: PackageType::parse(&package_type),
            price,
            deposit,
            duration,
            features: serde_json::from_str(&features).unwrap_or_default(),
            notes,
        });
    }
    Ok(packages)
}

pub fn upsert_package(conn: &Connection, package: &Package) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO packages (name, package_type, price, deposit, duration, features, notes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(name) DO UPDATE SET
           package_type = excluded.package_type,
           price = excluded.price,
           deposit = excluded.deposit,
           duration = excluded.duration,
           features = excluded.features,
           notes = excluded.notes,
           updated_at = excluded.updated_at",
        params![
            package.name,
            package.package_type.as_str(),
            package.price,
            package.deposit,
            package.duration,
            serde_json::to_string(&package.features)?,
            package.notes,
            now_ts(),
        ],
    )?;
    Ok(())
}

// ── Conversations ──

pub fn get_conversation(conn: &Connection, customer_id: &str) -> anyhow::Result<Option<Conversation>> {
    let now = now_ts();
    let row = conn
        .query_row(
            "SELECT customer_id, messages, started_at, last_activity, expires_at
             FROM conversations WHERE customer_id = ?1 AND expires_at > ?2",
            params![customer_id, now],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(customer_id, messages, started_at, last_activity, expires_at)| {
        let messages: Vec<ConversationMessage> = serde_json::from_str(&messages).unwrap_or_default();
        Conversation {
            customer_id,
            messages,
            started_at: parse_ts(&started_at),
            last_activity: parse_ts(&last_activity),
            expires_at: parse_ts(&expires_at),
        }
    }))
}

pub fn save_conversation(conn: &Connection, conv: &Conversation) -> anyhow::Result<()> {
    let messages = serde_json::to_string(&conv.messages)?;
    conn.execute(
        "INSERT INTO conversations (customer_id, messages, started_at, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(customer_id) DO UPDATE SET
           messages = excluded.messages,
           started_at = excluded.started_at,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![
            conv.customer_id,
            messages,
            fmt_ts(&conv.started_at),
            fmt_ts(&conv.last_activity),
            fmt_ts(&conv.expires_at)
        ],
    )?;
    Ok(())
}

pub fn expire_old_conversations(conn: &Connection) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM conversations WHERE expires_at <= ?1",
        params![now_ts()],
    )?;
    Ok(count)
}

// ── Booking Drafts ──

pub fn get_draft(conn: &Connection, customer_id: &str) -> anyhow::Result<Option<BookingDraft>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM booking_drafts WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn save_draft(conn: &Connection, draft: &BookingDraft) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO booking_drafts (customer_id, step, data, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(customer_id) DO UPDATE SET
           step = excluded.step,
           data = excluded.data,
           updated_at = excluded.updated_at",
        params![
            draft.customer_id,
            draft.step.as_str(),
            serde_json::to_string(draft)?,
            fmt_ts(&draft.updated_at)
        ],
    )?;
    Ok(())
}

pub fn delete_draft(conn: &Connection, customer_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM booking_drafts WHERE customer_id = ?1",
        params![customer_id],
    )?;
    Ok(count > 0)
}

pub fn get_draft_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<BookingDraft>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM booking_drafts WHERE json_extract(data, '$.booking_id') = ?1",
            params![booking_id],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn count_drafts_at(conn: &Connection, step: DraftStep) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM booking_drafts WHERE step = ?1",
        params![step.as_str()],
        |row| row.get(0),
    )?)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, service, customer_name, phone, date_time, duration_minutes, status, payment_reference, created_at, updated_at";

#[derive(Debug)]
pub enum GuardedWrite {
    Written,
    Conflict(Vec<Booking>),
}

// Check and insert share one transaction.
pub fn create_booking_guarded(conn: &Connection, booking: &Booking) -> anyhow::Result<GuardedWrite> {
    let tx = conn.unchecked_transaction()?;
    let clashes = overlapping_bookings(
        &tx,
        &booking.date_time,
        &booking.end_time(),
        &[BookingStatus::Provisional, BookingStatus::Confirmed],
    )?;
    if !clashes.is_empty() {
        return Ok(GuardedWrite::Conflict(clashes));
    }
    insert_booking(&tx, booking)?;
    tx.commit()?;
    Ok(GuardedWrite::Written)
}

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    insert_booking(conn, booking)
}

fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, service, customer_name, phone, date_time, end_time, duration_minutes, status, payment_reference, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            booking.id,
            booking.customer_id,
            booking.service,
            booking.customer_name,
            booking.phone,
            fmt_ts(&booking.date_time),
            fmt_ts(&booking.end_time()),
            booking.duration_minutes,
            booking.status.as_str(),
            booking.payment_reference,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn confirm_booking_guarded(
    conn: &Connection,
    id: &str,
    payment_reference: Option<&str>,
) -> anyhow::Result<GuardedWrite> {
    let tx = conn.unchecked_transaction()?;
    let booking = get_booking_by_id(&tx, id)?
        .ok_or_else(|| anyhow::anyhow!("booking {id} not found"))?;

    let clashes: Vec<Booking> = overlapping_bookings(
        &tx,
        &booking.date_time,
        &booking.end_time(),
        &[BookingStatus::Confirmed],
    )?
    .into_iter()
    .filter(|b| b.id != booking.id)
    .collect();
    if !clashes.is_empty() {
        return Ok(GuardedWrite::Conflict(clashes));
    }

    tx.execute(
        "UPDATE bookings SET status = 'confirmed', payment_reference = COALESCE(?2, payment_reference), updated_at = ?3 WHERE id = ?1",
        params![id, payment_reference, now_ts()],
    )?;
    tx.commit()?;
    Ok(GuardedWrite::Written)
}

pub fn overlapping_bookings(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    statuses: &[BookingStatus],
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE date_time < ?1 AND end_time > ?2 ORDER BY date_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_ts(end), fmt_ts(start)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        let booking = row??;
        if statuses.contains(&booking.status) {
            bookings.push(booking);
        }
    }
    Ok(bookings)
}

pub fn get_bookings_for_customer(conn: &Connection, customer_id: &str) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_id = ?1 ORDER BY date_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![customer_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_ts(), id],
    )?;
    Ok(count > 0)
}

pub fn set_payment_reference(conn: &Connection, id: &str, reference: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET payment_reference = ?1, updated_at = ?2 WHERE id = ?3",
        params![reference, now_ts(), id],
    )?;
    Ok(())
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY date_time DESC LIMIT ?2"),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY date_time DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;

    result.transpose()
}

pub fn confirmed_spend(conn: &Connection, customer_id: &str) -> anyhow::Result<(i64, f64)> {
    Ok(conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(p.price), 0)
         FROM bookings b LEFT JOIN packages p ON p.name = b.service
         WHERE b.customer_id = ?1 AND b.status = 'confirmed'",
        params![customer_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_time: String = row.get(5)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        service: row.get(2)?,
        customer_name: row.get(3)?,
        phone: row.get(4)?,
        date_time: parse_ts(&date_time),
        duration_minutes: row.get(6)?,
        status: BookingStatus::parse(&status),
        payment_reference: row.get(8)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

pub struct DashboardStats {
    pub customers: i64,
    pub open_escalations: i64,
    pub upcoming_confirmed: i64,
    pub awaiting_deposit: i64,
}

pub fn get_dashboard_stats(conn: &Connection) -> anyhow::Result<DashboardStats> {
    let now = now_ts();
    let customers: i64 = conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?;
    let open_escalations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM escalations WHERE status = 'open'",
        [],
        |row| row.get(0),
    )?;
    let upcoming_confirmed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE date_time > ?1 AND status = 'confirmed'",
        params![now],
        |row| row.get(0),
    )?;
    let awaiting_deposit = count_drafts_at(conn, DraftStep::ConfirmDeposit)?;

    Ok(DashboardStats {
        customers,
        open_escalations,
        upcoming_confirmed,
        awaiting_deposit,
    })
}

// ── Escalations ──

pub fn find_open_escalation(
    conn: &Connection,
    customer_id: &str,
    kind: EscalationType,
) -> anyhow::Result<Option<Escalation>> {
    let result = conn
        .query_row(
            "SELECT id, customer_id, reason, kind, status, sentiment, metadata, created_at, resolved_at
             FROM escalations WHERE customer_id = ?1 AND kind = ?2 AND status = 'open'
             ORDER BY id DESC LIMIT 1",
            params![customer_id, kind.as_str()],
            |row| Ok(parse_escalation_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn insert_escalation(
    conn: &Connection,
    customer_id: &str,
    reason: &str,
    kind: EscalationType,
    sentiment: Option<f64>,
    metadata: &serde_json::Value,
) -> anyhow::Result<Escalation> {
    let now = Utc::now().naive_utc();
    conn.execute(
        "INSERT INTO escalations (customer_id, reason, kind, status, sentiment, metadata, created_at)
         VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6)",
        params![
            customer_id,
            reason,
            kind.as_str(),
            sentiment,
            metadata.to_string(),
            fmt_ts(&now)
        ],
    )?;

    Ok(Escalation {
        id: conn.last_insert_rowid(),
        customer_id: customer_id.to_string(),
        reason: reason.to_string(),
        kind,
        status: EscalationStatus::Open,
        sentiment,
        metadata: metadata.clone(),
        created_at: now,
        resolved_at: None,
    })
}

pub fn resolve_escalation(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE escalations SET status = 'resolved', resolved_at = ?1 WHERE id = ?2 AND status = 'open'",
        params![now_ts(), id],
    )?;
    Ok(count > 0)
}

pub fn list_escalations(
    conn: &Connection,
    status: Option<EscalationStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Escalation>> {
    let mut stmt = conn.prepare(
        "SELECT id, customer_id, reason, kind, status, sentiment, metadata, created_at, resolved_at
         FROM escalations WHERE (?1 IS NULL OR status = ?1) ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![status.map(|s| s.as_str()), limit], |row| {
        Ok(parse_escalation_row(row))
    })?;

    let mut escalations = vec![];
    for row in rows {
        escalations.push(row??);
    }
    Ok(escalations)
}

fn parse_escalation_row(row: &rusqlite::Row) -> anyhow::Result<Escalation> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let resolved_at: Option<String> = row.get(8)?;

    Ok(Escalation {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        reason: row.get(2)?,
        kind: EscalationType::parse(&kind),
        status: EscalationStatus::parse(&status),
        sentiment: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: parse_ts(&created_at),
        resolved_at: resolved_at.as_deref().map(parse_ts),
    })
}

// ── Session Notes ──

pub fn insert_session_note(conn: &Connection, customer_id: &str, note: &str) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO session_notes (customer_id, note, created_at) VALUES (?1, ?2, ?3)",
        params![customer_id, note, now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_session_notes(conn: &Connection, customer_id: &str) -> anyhow::Result<Vec<SessionNote>> {
    let mut stmt = conn.prepare(
        "SELECT id, customer_id, note, created_at FROM session_notes WHERE customer_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![customer_id], |row| {
        let created_at: String = row.get(3)?;
        Ok(SessionNote {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            note: row.get(2)?,
            created_at: parse_ts(&created_at),
        })
    })?;

    let mut notes = vec![];
    for row in rows {
        notes.push(row?);
    }
    Ok(notes)
}

// ── Learning Records ──

pub fn insert_learning_record(conn: &Connection, record: &ConversationLearningRecord) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO learning_records (customer_id, user_message, reply, intent, emotional_tone, success, outcome, conversation_length, resolution_secs, kb_flagged, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.customer_id,
            record.user_message,
            record.reply,
            record.intent.as_str(),
            record.emotional_tone.as_str(),
            record.success as i32,
            record.outcome.as_str(),
            record.conversation_length,
            record.resolution_secs,
            record.kb_flagged as i32,
            fmt_ts(&record.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_learning_records(
    conn: &Connection,
    intent: Option<Intent>,
) -> anyhow::Result<Vec<ConversationLearningRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, customer_id, user_message, reply, intent, emotional_tone, success, outcome, conversation_length, resolution_secs, kb_flagged, created_at
         FROM learning_records WHERE (?1 IS NULL OR intent = ?1) ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![intent.map(|i| i.as_str())], |row| {
        let intent: String = row.get(4)?;
        let tone: String = row.get(5)?;
        let outcome: String = row.get(7)?;
        let created_at: String = row.get(11)?;
        Ok(ConversationLearningRecord {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            user_message: row.get(2)?,
            reply: row.get(3)?,
            intent: Intent::parse(&intent),
            emotional_tone: EmotionalTone::parse(&tone),
            success: row.get::<_, i32>(6)? != 0,
            outcome: TurnOutcome::parse(&outcome),
            conversation_length: row.get(8)?,
            resolution_secs: row.get(9)?,
            kb_flagged: row.get::<_, i32>(10)? != 0,
            created_at: parse_ts(&created_at),
        })
    })?;

    let mut records = vec![];
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

pub fn flag_learning_records(conn: &Connection, ids: &[i64]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare("UPDATE learning_records SET kb_flagged = 1 WHERE id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

// ── Knowledge Base ──

pub fn upsert_faq_suggestion(
    conn: &Connection,
    question: &str,
    answer: &str,
    occurrences: i64,
    success_rate: f64,
) -> anyhow::Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM faq_entries WHERE question = ?1",
        params![question],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO faq_entries (question, answer, status, occurrences, success_rate)
         VALUES (?1, ?2, 'suggested', ?3, ?4)
         ON CONFLICT(question) DO UPDATE SET
           occurrences = excluded.occurrences,
           success_rate = excluded.success_rate",
        params![question, answer, occurrences, success_rate],
    )?;
    Ok(!exists)
}

pub fn list_faq_entries(
    conn: &Connection,
    status: Option<FaqEntryStatus>,
) -> anyhow::Result<Vec<FaqEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, question, answer, status, occurrences, success_rate
         FROM faq_entries WHERE (?1 IS NULL OR status = ?1) ORDER BY occurrences DESC, id ASC",
    )?;
    let rows = stmt.query_map(params![status.map(|s| s.as_str())], |row| {
        let status: String = row.get(3)?;
        Ok(FaqEntry {
            id: row.get(0)?,
            question: row.get(1)?,
            answer: row.get(2)?,
            status: FaqEntryStatus::parse(&status),
            occurrences: row.get(4)?,
            success_rate: row.get(5)?,
        })
    })?;

    let mut entries = vec![];
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn activate_faq_entry(conn: &Connection, id: i64, answer: Option<&str>) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE faq_entries SET status = 'active', answer = COALESCE(?2, answer) WHERE id = ?1",
        params![id, answer],
    )?;
    Ok(count > 0)
}
