//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use gym_api::{
    Class, ClassSchedule, Enrollment, Member, MemberStatus, Membership, UnknownVariant,
};
use gym_util::{ClassId, EnrollmentId, MemberId, MembershipId, TrainerId, WallClock};
use rusqlite::{Connection, OptionalExtension, Params, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult, StoreTx};

/// Lock timeout used by [`SqliteStore::in_memory`]
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(2);

const SCHEMA: &str = r#"
    -- Named counters for human-readable ids
    CREATE TABLE IF NOT EXISTS sequences (
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS members (
        member_id TEXT PRIMARY KEY,
        internal_id TEXT NOT NULL UNIQUE,
        username TEXT UNIQUE,
        name TEXT NOT NULL,
        email TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS memberships (
        membership_id TEXT PRIMARY KEY,
        member_id TEXT NOT NULL REFERENCES members(member_id),
        position INTEGER NOT NULL,
        kind TEXT NOT NULL,
        duration INTEGER NOT NULL CHECK (duration >= 0),
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        remaining_sessions INTEGER NOT NULL
            CHECK (remaining_sessions >= 0 AND remaining_sessions <= duration),
        status TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS classes (
        class_id TEXT PRIMARY KEY,
        seq INTEGER NOT NULL UNIQUE,
        name TEXT NOT NULL,
        trainer_id TEXT NOT NULL,
        schedule TEXT NOT NULL,
        capacity INTEGER NOT NULL,
        current_enrollment INTEGER NOT NULL DEFAULT 0 CHECK (current_enrollment >= 0),
        archived INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    -- Enrollment ledger (never deleted)
    CREATE TABLE IF NOT EXISTS enrollments (
        enrollment_id TEXT PRIMARY KEY,
        class_id TEXT NOT NULL REFERENCES classes(class_id),
        member_id TEXT NOT NULL REFERENCES members(member_id),
        membership_id TEXT NOT NULL REFERENCES memberships(membership_id),
        session_date TEXT NOT NULL,
        session_time TEXT NOT NULL,
        status TEXT NOT NULL,
        attendance_status TEXT NOT NULL,
        refund_processed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        cancelled_at TEXT,
        attendance_marked_at TEXT
    );

    -- Audit log (append-only)
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_json TEXT NOT NULL
    );

    -- One active booking per member, class and date
    CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_active_booking
        ON enrollments(member_id, class_id, session_date) WHERE status = 'active';

    -- Indexes
    CREATE INDEX IF NOT EXISTS idx_enrollments_sweep
        ON enrollments(attendance_status, session_date);
    CREATE INDEX IF NOT EXISTS idx_enrollments_class ON enrollments(class_id);
    CREATE INDEX IF NOT EXISTS idx_memberships_member ON memberships(member_id, position);
    CREATE INDEX IF NOT EXISTS idx_memberships_expiry ON memberships(status, end_date);
    CREATE INDEX IF NOT EXISTS idx_classes_trainer ON classes(trainer_id, seq);
    CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
"#;

const MEMBER_COLUMNS: &str = "member_id, internal_id, username, name, email, status, created_at";

const MEMBERSHIP_COLUMNS: &str =
    "membership_id, kind, duration, start_date, end_date, remaining_sessions, status";

const CLASS_COLUMNS: &str =
    "class_id, name, trainer_id, schedule, capacity, current_enrollment, archived, created_at";

const ENROLLMENT_COLUMNS: &str = "enrollment_id, class_id, member_id, membership_id, \
     session_date, session_time, status, attendance_status, refund_processed, created_at, \
     cancelled_at, attendance_marked_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    lock_timeout: Duration,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>, lock_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, lock_timeout)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, DEFAULT_LOCK_TIMEOUT)
    }

    fn with_connection(conn: Connection, lock_timeout: Duration) -> StoreResult<Self> {
        conn.busy_timeout(lock_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
            lock_timeout,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        debug!("Store schema initialized");
        Ok(())
    }

    /// Take the connection, waiting at most the lock timeout
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.conn.try_lock() {
                Ok(guard) => return Ok(guard),
                // A panicking holder rolled back on drop, so the connection is clean
                Err(TryLockError::Poisoned(poisoned)) => {
                    warn!("Store connection lock was poisoned, recovering");
                    return Ok(poisoned.into_inner());
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        warn!(
                            timeout_ms = self.lock_timeout.as_millis() as u64,
                            "Timed out waiting for store lock"
                        );
                        return Err(StoreError::Busy);
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }
}

impl Store for SqliteStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTx + '_>> {
        let conn = self.lock()?;
        Ok(Box::new(SqliteTx::begin(conn, "BEGIN IMMEDIATE")?))
    }

    fn read(&self) -> StoreResult<Box<dyn StoreTx + '_>> {
        let conn = self.lock()?;
        Ok(Box::new(SqliteTx::begin(conn, "BEGIN DEFERRED")?))
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = parse_timestamp(&timestamp_str)?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.lock() {
            Ok(conn) => conn.execute_batch("SELECT 1").is_ok(),
            Err(e) => {
                warn!(error = %e, "Store health check failed");
                false
            }
        }
    }
}

/// Transaction over the single store connection
pub struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl<'a> SqliteTx<'a> {
    fn begin(conn: MutexGuard<'a, Connection>, statement: &str) -> StoreResult<Self> {
        conn.execute_batch(statement)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    fn load_memberships(&self, member_id: &str) -> StoreResult<Vec<Membership>> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE member_id = ? ORDER BY position"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([member_id], MembershipRow::read)?;

        let mut memberships = Vec::new();
        for row in rows {
            memberships.push(row?.into_membership()?);
        }
        Ok(memberships)
    }

    fn load_member(&self, filter: &str, params: impl Params) -> StoreResult<Option<Member>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members {filter}");
        let row = self
            .conn
            .query_row(&sql, params, |row| {
                Ok(MemberRow {
                    member_id: row.get(0)?,
                    internal_id: row.get(1)?,
                    username: row.get(2)?,
                    name: row.get(3)?,
                    email: row.get(4)?,
                    status: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .optional()?;

        match row {
            Some(row) => {
                let memberships = self.load_memberships(&row.member_id)?;
                Ok(Some(row.into_member(memberships)?))
            }
            None => Ok(None),
        }
    }

    fn query_classes(&self, filter: &str, params: impl Params) -> StoreResult<Vec<Class>> {
        let sql = format!("SELECT {CLASS_COLUMNS} FROM classes {filter}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(ClassRow {
                class_id: row.get(0)?,
                name: row.get(1)?,
                trainer_id: row.get(2)?,
                schedule: row.get(3)?,
                capacity: row.get(4)?,
                current_enrollment: row.get(5)?,
                archived: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;

        let mut raw = Vec::new();
        for row in rows {
            raw.push(row?);
        }

        let mut classes = Vec::with_capacity(raw.len());
        for row in raw {
            let roster = self
                .query_enrollments(
                    "WHERE class_id = ? ORDER BY session_date, created_at",
                    [&row.class_id],
                )?
                .iter()
                .map(Enrollment::roster_entry)
                .collect();
            let mut class = row.into_class()?;
            class.enrolled_members = roster;
            classes.push(class);
        }
        Ok(classes)
    }

    fn query_enrollments(&self, filter: &str, params: impl Params) -> StoreResult<Vec<Enrollment>> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments {filter}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, EnrollmentRow::read)?;

        let mut enrollments = Vec::new();
        for row in rows {
            enrollments.push(row?.into_enrollment()?);
        }
        Ok(enrollments)
    }

    fn expect_one_row(changed: usize, what: impl FnOnce() -> String) -> StoreResult<()> {
        if changed == 0 {
            return Err(StoreError::NotFound(what()));
        }
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished
            && let Err(e) = self.conn.execute_batch("ROLLBACK")
        {
            warn!(error = %e, "Failed to roll back transaction");
        }
    }
}

impl StoreTx for SqliteTx<'_> {
    fn next_sequence(&self, name: &str) -> StoreResult<u64> {
        self.conn.execute(
            "INSERT INTO sequences (name, value) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1",
            [name],
        )?;
        let value: i64 =
            self.conn
                .query_row("SELECT value FROM sequences WHERE name = ?", [name], |row| {
                    row.get(0)
                })?;
        Ok(value as u64)
    }

    fn insert_member(&self, member: &Member) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO members (member_id, internal_id, username, name, email, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                member.member_id.as_str(),
                member.internal_id.to_string(),
                member.username,
                member.name,
                member.email,
                member.status.as_str(),
                member.created_at.to_rfc3339(),
            ],
        )?;

        for membership in &member.memberships {
            self.insert_membership(&member.member_id, membership)?;
        }

        debug!(member_id = %member.member_id, "Member inserted");
        Ok(())
    }

    fn update_member_status(&self, member_id: &MemberId, status: MemberStatus) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE members SET status = ? WHERE member_id = ?",
            params![status.as_str(), member_id.as_str()],
        )?;
        Self::expect_one_row(changed, || format!("member {}", member_id))
    }

    fn get_member(&self, member_id: &MemberId) -> StoreResult<Option<Member>> {
        self.load_member("WHERE member_id = ?", [member_id.as_str()])
    }

    fn find_member(&self, identifier: &str) -> StoreResult<Option<Member>> {
        let identifier = identifier.trim();
        // Internal ids are stored hyphenated and lowercase
        let internal = Uuid::parse_str(identifier)
            .map(|u| u.to_string())
            .unwrap_or_default();

        self.load_member(
            "WHERE member_id = ?1 OR internal_id = ?2 OR username = ?1
             ORDER BY CASE WHEN member_id = ?1 THEN 0 WHEN internal_id = ?2 THEN 1 ELSE 2 END
             LIMIT 1",
            params![identifier, internal],
        )
    }

    fn insert_membership(&self, member_id: &MemberId, membership: &Membership) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO memberships (membership_id, member_id, position, kind, duration,
                 start_date, end_date, remaining_sessions, status)
             VALUES (?1, ?2,
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM memberships WHERE member_id = ?2),
                 ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                membership.membership_id.to_string(),
                member_id.as_str(),
                membership.kind.as_str(),
                membership.duration,
                format_day(membership.start_date),
                format_day(membership.end_date),
                membership.remaining_sessions,
                membership.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn update_membership(&self, membership: &Membership) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE memberships SET remaining_sessions = ?, status = ? WHERE membership_id = ?",
            params![
                membership.remaining_sessions,
                membership.status.as_str(),
                membership.membership_id.to_string(),
            ],
        )?;
        Self::expect_one_row(changed, || format!("membership {}", membership.membership_id))
    }

    fn get_membership(&self, membership_id: &MembershipId) -> StoreResult<Option<Membership>> {
        let sql = format!("SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE membership_id = ?");
        let row = self
            .conn
            .query_row(&sql, [membership_id.to_string()], MembershipRow::read)
            .optional()?;
        row.map(MembershipRow::into_membership).transpose()
    }

    fn active_memberships_ending_by(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Vec<(MemberId, Membership)>> {
        let sql = format!(
            "SELECT member_id, {MEMBERSHIP_COLUMNS} FROM memberships
             WHERE status = 'active' AND end_date <= ? ORDER BY member_id, position"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([format_day(date)], |row| {
            let member_id: String = row.get(0)?;
            let membership = MembershipRow {
                membership_id: row.get(1)?,
                kind: row.get(2)?,
                duration: row.get(3)?,
                start_date: row.get(4)?,
                end_date: row.get(5)?,
                remaining_sessions: row.get(6)?,
                status: row.get(7)?,
            };
            Ok((member_id, membership))
        })?;

        let mut due = Vec::new();
        for row in rows {
            let (member_id, membership) = row?;
            due.push((MemberId::new(member_id), membership.into_membership()?));
        }
        Ok(due)
    }

    fn insert_class(&self, class: &Class) -> StoreResult<()> {
        let seq = class.class_id.sequence().ok_or_else(|| {
            StoreError::InvalidData(format!("class id {} has no sequence", class.class_id))
        })?;

        self.conn.execute(
            "INSERT INTO classes (class_id, seq, name, trainer_id, schedule, capacity,
                 current_enrollment, archived, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                class.class_id.as_str(),
                seq as i64,
                class.name,
                class.trainer_id.as_str(),
                class.schedule.descriptor(),
                class.capacity,
                class.current_enrollment,
                class.archived,
                class.created_at.to_rfc3339(),
            ],
        )?;
        debug!(class_id = %class.class_id, "Class inserted");
        Ok(())
    }

    fn update_class(&self, class: &Class) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE classes SET name = ?, trainer_id = ?, schedule = ?, capacity = ?,
                 current_enrollment = ?, archived = ?
             WHERE class_id = ?",
            params![
                class.name,
                class.trainer_id.as_str(),
                class.schedule.descriptor(),
                class.capacity,
                class.current_enrollment,
                class.archived,
                class.class_id.as_str(),
            ],
        )?;
        Self::expect_one_row(changed, || format!("class {}", class.class_id))
    }

    fn get_class(&self, class_id: &ClassId) -> StoreResult<Option<Class>> {
        Ok(self
            .query_classes("WHERE class_id = ?", [class_id.as_str()])?
            .into_iter()
            .next())
    }

    fn list_classes(&self, include_archived: bool) -> StoreResult<Vec<Class>> {
        if include_archived {
            self.query_classes("ORDER BY seq", [])
        } else {
            self.query_classes("WHERE archived = 0 ORDER BY seq", [])
        }
    }

    fn classes_for_trainer(&self, trainer_id: &TrainerId) -> StoreResult<Vec<Class>> {
        self.query_classes(
            "WHERE trainer_id = ? AND archived = 0 ORDER BY seq",
            [trainer_id.as_str()],
        )
    }

    fn count_active_enrollments(&self, class_id: &ClassId) -> StoreResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM enrollments WHERE class_id = ? AND status = 'active'",
            [class_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO enrollments (enrollment_id, class_id, member_id, membership_id,
                 session_date, session_time, status, attendance_status, refund_processed,
                 created_at, cancelled_at, attendance_marked_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                enrollment.enrollment_id.to_string(),
                enrollment.class_id.as_str(),
                enrollment.member_id.as_str(),
                enrollment.membership_id.to_string(),
                format_day(enrollment.session_date),
                enrollment.session_time.to_string(),
                enrollment.status.as_str(),
                enrollment.attendance_status.as_str(),
                enrollment.refund_processed,
                enrollment.created_at.to_rfc3339(),
                enrollment.cancelled_at.map(|t| t.to_rfc3339()),
                enrollment.attendance_marked_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE enrollments SET status = ?, attendance_status = ?, refund_processed = ?,
                 cancelled_at = ?, attendance_marked_at = ?
             WHERE enrollment_id = ?",
            params![
                enrollment.status.as_str(),
                enrollment.attendance_status.as_str(),
                enrollment.refund_processed,
                enrollment.cancelled_at.map(|t| t.to_rfc3339()),
                enrollment.attendance_marked_at.map(|t| t.to_rfc3339()),
                enrollment.enrollment_id.to_string(),
            ],
        )?;
        Self::expect_one_row(changed, || format!("enrollment {}", enrollment.enrollment_id))
    }

    fn get_enrollment(&self, enrollment_id: &EnrollmentId) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .query_enrollments("WHERE enrollment_id = ?", [enrollment_id.to_string()])?
            .into_iter()
            .next())
    }

    fn find_active_enrollment(
        &self,
        member_id: &MemberId,
        class_id: &ClassId,
        session_date: NaiveDate,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .query_enrollments(
                "WHERE member_id = ? AND class_id = ? AND session_date = ? AND status = 'active'",
                params![member_id.as_str(), class_id.as_str(), format_day(session_date)],
            )?
            .into_iter()
            .next())
    }

    fn scheduled_enrollments_before(&self, date: NaiveDate) -> StoreResult<Vec<Enrollment>> {
        self.query_enrollments(
            "WHERE attendance_status = 'scheduled' AND status = 'active' AND session_date < ?
             ORDER BY session_date, created_at",
            [format_day(date)],
        )
    }

    fn scheduled_enrollments_for_class(&self, class_id: &ClassId) -> StoreResult<Vec<Enrollment>> {
        self.query_enrollments(
            "WHERE class_id = ? AND attendance_status = 'scheduled' AND status = 'active'
             ORDER BY session_date, created_at",
            [class_id.as_str()],
        )
    }

    fn append_audit(&self, event: &AuditEvent) -> StoreResult<i64> {
        let event_json = serde_json::to_string(&event.event)?;

        self.conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(event_id = id, "Audit event appended");

        Ok(id)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

struct MemberRow {
    member_id: String,
    internal_id: String,
    username: Option<String>,
    name: String,
    email: Option<String>,
    status: String,
    created_at: String,
}

impl MemberRow {
    fn into_member(self, memberships: Vec<Membership>) -> StoreResult<Member> {
        Ok(Member {
            member_id: MemberId::new(self.member_id),
            internal_id: parse_uuid(&self.internal_id)?,
            username: self.username,
            name: self.name,
            email: self.email,
            status: parse_text(&self.status)?,
            memberships,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct MembershipRow {
    membership_id: String,
    kind: String,
    duration: u32,
    start_date: String,
    end_date: String,
    remaining_sessions: u32,
    status: String,
}

impl MembershipRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            membership_id: row.get(0)?,
            kind: row.get(1)?,
            duration: row.get(2)?,
            start_date: row.get(3)?,
            end_date: row.get(4)?,
            remaining_sessions: row.get(5)?,
            status: row.get(6)?,
        })
    }

    fn into_membership(self) -> StoreResult<Membership> {
        Ok(Membership {
            membership_id: MembershipId::from_uuid(parse_uuid(&self.membership_id)?),
            kind: parse_text(&self.kind)?,
            duration: self.duration,
            start_date: parse_day(&self.start_date)?,
            end_date: parse_day(&self.end_date)?,
            remaining_sessions: self.remaining_sessions,
            status: parse_text(&self.status)?,
        })
    }
}

struct ClassRow {
    class_id: String,
    name: String,
    trainer_id: String,
    schedule: String,
    capacity: u32,
    current_enrollment: u32,
    archived: bool,
    created_at: String,
}

impl ClassRow {
    fn into_class(self) -> StoreResult<Class> {
        Ok(Class {
            class_id: ClassId::new(self.class_id),
            name: self.name,
            trainer_id: TrainerId::new(self.trainer_id),
            schedule: ClassSchedule::from_descriptor(&self.schedule),
            capacity: self.capacity,
            current_enrollment: self.current_enrollment,
            enrolled_members: Vec::new(),
            archived: self.archived,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct EnrollmentRow {
    enrollment_id: String,
    class_id: String,
    member_id: String,
    membership_id: String,
    session_date: String,
    session_time: String,
    status: String,
    attendance_status: String,
    refund_processed: bool,
    created_at: String,
    cancelled_at: Option<String>,
    attendance_marked_at: Option<String>,
}

impl EnrollmentRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            enrollment_id: row.get(0)?,
            class_id: row.get(1)?,
            member_id: row.get(2)?,
            membership_id: row.get(3)?,
            session_date: row.get(4)?,
            session_time: row.get(5)?,
            status: row.get(6)?,
            attendance_status: row.get(7)?,
            refund_processed: row.get(8)?,
            created_at: row.get(9)?,
            cancelled_at: row.get(10)?,
            attendance_marked_at: row.get(11)?,
        })
    }

    fn into_enrollment(self) -> StoreResult<Enrollment> {
        Ok(Enrollment {
            enrollment_id: EnrollmentId::from_uuid(parse_uuid(&self.enrollment_id)?),
            class_id: ClassId::new(self.class_id),
            member_id: MemberId::new(self.member_id),
            membership_id: MembershipId::from_uuid(parse_uuid(&self.membership_id)?),
            session_date: parse_day(&self.session_date)?,
            session_time: WallClock::parse(&self.session_time)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            status: parse_text(&self.status)?,
            attendance_status: parse_text(&self.attendance_status)?,
            refund_processed: self.refund_processed,
            created_at: parse_timestamp(&self.created_at)?,
            cancelled_at: self.cancelled_at.as_deref().map(parse_timestamp).transpose()?,
            attendance_marked_at: self
                .attendance_marked_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_day(s: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| StoreError::InvalidData(format!("bad date '{}'", s)))
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|_| StoreError::InvalidData(format!("bad timestamp '{}'", s)))
}

fn parse_uuid(s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|_| StoreError::InvalidData(format!("bad uuid '{}'", s)))
}

fn parse_text<T>(s: &str) -> StoreResult<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    s.parse()
        .map_err(|e: UnknownVariant| StoreError::InvalidData(e.to_string()))
}
