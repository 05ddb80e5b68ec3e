pub const PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
-- query scratch tables spill to disk instead of memory
PRAGMA temp_store = FILE;
"#;

pub const SCHEMA: &str = r#"
-- feeds table
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1,
    total_articles INTEGER NOT NULL DEFAULT 0,
    visible_articles INTEGER NOT NULL DEFAULT 0,
    unread_articles INTEGER NOT NULL DEFAULT 0,
    marked_articles INTEGER NOT NULL DEFAULT 0,
    starred_articles INTEGER NOT NULL DEFAULT 0,
    last_update TEXT
);

CREATE INDEX IF NOT EXISTS idx_feeds_active ON feeds(active);

-- tags table (feeds holds a JSON array of referencing feed ids)
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    feeds TEXT NOT NULL DEFAULT '[]',
    total_articles INTEGER NOT NULL DEFAULT 0,
    visible_articles INTEGER NOT NULL DEFAULT 0,
    unread_articles INTEGER NOT NULL DEFAULT 0,
    marked_articles INTEGER NOT NULL DEFAULT 0,
    starred_articles INTEGER NOT NULL DEFAULT 0
);

-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    feed_name TEXT NOT NULL,
    title TEXT NOT NULL,
    link TEXT,
    content TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL DEFAULT '',
    author TEXT,
    language TEXT,
    subtitle TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    date TEXT NOT NULL,
    downloaded TEXT NOT NULL,
    show INTEGER NOT NULL DEFAULT 1,
    read INTEGER NOT NULL DEFAULT 0,
    marked INTEGER NOT NULL DEFAULT 0,
    starred INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_articles_feed_id ON articles(feed_id);
CREATE INDEX IF NOT EXISTS idx_articles_date ON articles(date DESC);
CREATE INDEX IF NOT EXISTS idx_articles_visibility ON articles(show, read, marked);

-- staged_articles table (fetched, not yet committed)
CREATE TABLE IF NOT EXISTS staged_articles (
    id TEXT PRIMARY KEY,
    feed_id INTEGER NOT NULL,
    feed_name TEXT NOT NULL,
    title TEXT NOT NULL,
    link TEXT,
    content TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL DEFAULT '',
    author TEXT,
    language TEXT,
    subtitle TEXT,
    date TEXT NOT NULL,
    staged_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_staged_articles_staged_at ON staged_articles(staged_at);
"#;
