//! A throwaway Messages database with just enough schema for the exporter.

#![allow(dead_code)]

use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

pub const ACCOUNT: &str = "+15554443333";
pub const OTHER_ACCOUNT: &str = "friend@example.com";

/// Seconds after the Apple epoch used as "t = 0" in fixtures.
pub const BASE: i64 = 700_000_000;

const SCHEMA: &str = "
    CREATE TABLE handle (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT NOT NULL, service TEXT NOT NULL);
    CREATE TABLE chat (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, guid TEXT NOT NULL UNIQUE, chat_identifier TEXT);
    CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);
    CREATE TABLE message (
        ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
        handle_id INTEGER DEFAULT 0,
        text TEXT,
        date INTEGER,
        is_from_me INTEGER DEFAULT 0,
        cache_has_attachments INTEGER DEFAULT 0
    );
    CREATE TABLE attachment (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, filename TEXT);
    CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
";

pub struct Fixture {
    pub dir: TempDir,
    pub db_path: PathBuf,
    conn: Connection,
    pub handle: i64,
    pub other_handle: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("chat.db");
        let conn = Connection::open(&db_path).expect("open fixture db");
        conn.execute_batch(SCHEMA).expect("schema");

        let mut fixture = Self {
            dir,
            db_path,
            conn,
            handle: 0,
            other_handle: 0,
        };
        fixture.handle = fixture.add_contact(ACCOUNT, "iMessage");
        fixture.other_handle = fixture.add_contact(OTHER_ACCOUNT, "iMessage");
        fixture
    }

    pub fn add_contact(&self, account: &str, service: &str) -> i64 {
        self.conn
            .execute(
                "INSERT INTO handle (id, service) VALUES (?1, ?2)",
                params![account, service],
            )
            .unwrap();
        let handle = self.conn.last_insert_rowid();
        self.conn
            .execute(
                "INSERT INTO chat (guid, chat_identifier) VALUES (?1, ?2)",
                params![format!("{};-;{}", service, account), account],
            )
            .unwrap();
        let chat = self.conn.last_insert_rowid();
        self.conn
            .execute(
                "INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (?1, ?2)",
                params![chat, handle],
            )
            .unwrap();
        handle
    }

    /// Insert a message `offset_secs` after [`BASE`], stored in nanoseconds like
    /// current macOS releases do.
    pub fn message(&self, handle: i64, from_me: bool, text: Option<&str>, offset_secs: i64) -> i64 {
        self.conn
            .execute(
                "INSERT INTO message (handle_id, text, date, is_from_me) VALUES (?1, ?2, ?3, ?4)",
                params![handle, text, (BASE + offset_secs) * 1_000_000_000, from_me],
            )
            .unwrap();
        self.conn.last_insert_rowid()
    }

    /// Link an attachment row to `message` and flag the message as having one.
    pub fn attach(&self, message: i64, filename: Option<&str>) {
        self.conn
            .execute(
                "UPDATE message SET cache_has_attachments = 1 WHERE ROWID = ?1",
                [message],
            )
            .unwrap();
        if let Some(filename) = filename {
            self.conn
                .execute("INSERT INTO attachment (filename) VALUES (?1)", [filename])
                .unwrap();
            let attachment = self.conn.last_insert_rowid();
            self.conn
                .execute(
                    "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
                    [message, attachment],
                )
                .unwrap();
        }
    }

    /// Create a source file for an attachment and return its absolute path.
    pub fn media(&self, name: &str, bytes: &[u8]) -> String {
        let dir = self.dir.path().join("Attachments");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Blank out generated attachment tokens so two renders can be compared.
pub fn mask_attachment_names(html: &str) -> String {
    const MARKER: &str = "attachments/";
    const TOKEN_LEN: usize = 36;

    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find(MARKER) {
        let after = pos + MARKER.len();
        out.push_str(&rest[..after]);
        out.push_str("<token>");
        rest = rest.get(after + TOKEN_LEN..).unwrap_or("");
    }
    out.push_str(rest);
    out
}
