//! Identities and rows shared by the index, its handlers and its sources.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Stable identity of a page.
///
/// Assigned by the host once when the page is created and never changed afterwards, in
/// particular not by renames. The index is keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(i64);

impl PageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl From<i64> for PageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PageId {
    type Err = <i64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(PageId::new)
    }
}

/// Identity of a single revision of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisionId(i64);

impl RevisionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace number of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(i32);

impl Namespace {
    /// The main article namespace.
    pub const MAIN: Namespace = Namespace(0);
    /// Discussion pages of main namespace articles.
    pub const TALK: Namespace = Namespace(1);
    /// Reusable page fragments.
    pub const TEMPLATE: Namespace = Namespace(10);

    pub fn new(number: i32) -> Self {
        Self(number)
    }

    pub fn into_inner(self) -> i32 {
        self.0
    }
}

impl From<i32> for Namespace {
    fn from(number: i32) -> Self {
        Self(number)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Title of a page at some point in time.
///
/// Titles change on renames, so they are never used to key the index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Title {
    pub namespace: Namespace,
    /// Title text in storage form, with underscores instead of spaces.
    pub db_key: String,
}

impl Title {
    pub fn new(namespace: Namespace, text: &str) -> Self {
        Self {
            namespace,
            db_key: text.trim().replace(' ', "_"),
        }
    }

    /// Shorthand for a title in [`Namespace::MAIN`].
    pub fn main(text: &str) -> Self {
        Self::new(Namespace::MAIN, text)
    }

    /// Title text with spaces, as shown to readers.
    pub fn text(&self) -> String {
        self.db_key.replace('_', " ")
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.text())
    }
}

/// Numeric user id assigned by the host. `0` identifies anonymous actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserId(i64);

impl UserId {
    pub const ANONYMOUS: UserId = UserId(0);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> i64 {
        self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == 0
    }
}

/// Display name of an actor in its normalized form.
///
/// The host spells names with underscores in links and with spaces in storage. Both spellings
/// normalize to the same value, which is what identifies an author.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorName(String);

impl ActorName {
    pub fn new(name: &str) -> Self {
        Self(name.replace('_', " ").trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ActorName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ActorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The author credited with a revision: a registered user or an anonymous (IP) actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    pub id: UserId,
    pub name: ActorName,
}

impl Actor {
    /// A registered user.
    pub fn user(id: i64, name: &str) -> Self {
        Self {
            id: UserId::new(id),
            name: ActorName::new(name),
        }
    }

    /// An anonymous actor, usually named after its IP address.
    pub fn anonymous(name: &str) -> Self {
        Self {
            id: UserId::ANONYMOUS,
            name: ActorName::new(name),
        }
    }

    /// Returns `true` when both values identify the same author.
    pub fn is_same_author(&self, other: &Actor) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id.0)
    }
}

/// One revision of a page as reported by a content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub id: RevisionId,
    pub page: PageId,
    pub author: Actor,
    pub timestamp: DateTime<Utc>,
}

impl Revision {
    /// Ordering used to pick a page's creating revision among several candidates: earliest
    /// timestamp first, then the lowest revision id.
    pub fn creation_order(&self) -> (DateTime<Utc>, RevisionId) {
        (self.timestamp, self.id)
    }
}

/// The single fact stored per page: who created it and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub page: PageId,
    pub creator: Actor,
    pub timestamp: DateTime<Utc>,
}

impl IndexRow {
    pub fn new(page: PageId, creator: Actor, timestamp: DateTime<Utc>) -> Self {
        Self {
            page,
            creator,
            timestamp,
        }
    }

    /// Builds the row recording `revision` as the creation of its page.
    pub fn from_revision(revision: &Revision) -> Self {
        Self::new(revision.page, revision.author.clone(), revision.timestamp)
    }
}

/// Window into an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}
