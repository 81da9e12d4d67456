//! Composable SQL fragments and their rendering
//!
//! Statements are assembled from a handful of node kinds and rendered to a
//! string with `?` placeholders. [`render_and_rebind`] then normalizes
//! whitespace, terminates the statement, and hands it to a dialect for
//! placeholder rewriting.

use std::borrow::Cow;

/// Placeholder rewriting for a SQL dialect
pub trait Rebind {
    /// Rewrite `?` placeholders into the dialect's native form
    fn rebind(&self, sql: &str) -> String;
}

/// A SQL fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sql {
    /// Fixed text, rendered verbatim
    Literal(Cow<'static, str>),

    /// Sub-fragments joined by a separator. `None` entries are skipped so
    /// absent optional clauses leave no stray separator behind.
    Literals {
        join: Cow<'static, str>,
        sqls: Vec<Option<Sql>>,
    },

    /// A slot filled at build time. An unfilled hole renders as nothing.
    Hole(Option<Box<Sql>>),

    /// A comparison whose operator depends on equality and nullness
    Condition {
        left: Cow<'static, str>,
        right: Cow<'static, str>,
        equal: bool,
        null: bool,
    },
}

impl Sql {
    /// A fixed fragment
    pub fn literal(text: impl Into<Cow<'static, str>>) -> Self {
        Sql::Literal(text.into())
    }

    /// A joined list with every entry present
    pub fn join(join: impl Into<Cow<'static, str>>, sqls: Vec<Sql>) -> Self {
        Sql::Literals {
            join: join.into(),
            sqls: sqls.into_iter().map(Some).collect(),
        }
    }

    /// A hole with nothing in it yet
    pub fn hole() -> Self {
        Sql::Hole(None)
    }

    /// Fill a hole. Has no effect on other node kinds.
    pub fn fill(&mut self, sql: Sql) {
        if let Sql::Hole(slot) = self {
            *slot = Some(Box::new(sql));
        }
    }

    /// Render to a string with `?` placeholders
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Sql::Literal(text) => out.push_str(text),
            Sql::Literals { join, sqls } => {
                let mut first = true;
                for sql in sqls.iter().flatten() {
                    if !first {
                        out.push_str(join);
                    }
                    first = false;
                    sql.render_into(out);
                }
            }
            Sql::Hole(Some(sql)) => sql.render_into(out),
            Sql::Hole(None) => {}
            Sql::Condition {
                left,
                right,
                equal,
                null,
            } => {
                out.push_str(left);
                match (*equal, *null) {
                    (true, true) => out.push_str(" is null"),
                    (true, false) => {
                        out.push_str(" = ");
                        out.push_str(right);
                    }
                    (false, true) => out.push_str(" is not null"),
                    (false, false) => {
                        out.push_str(" != ");
                        out.push_str(right);
                    }
                }
            }
        }
    }
}

/// Per-call rendering switches. Both default to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Collapse whitespace runs and trim the ends
    pub flatten: bool,
    /// Append a `;`
    pub terminate: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            flatten: true,
            terminate: true,
        }
    }
}

/// Render `sql`, normalize it per `options`, and rebind it for `dialect`
pub fn render_and_rebind<D>(dialect: &D, sql: &Sql, options: RenderOptions) -> String
where
    D: Rebind + ?Sized,
{
    let mut out = sql.render();
    if options.flatten {
        out = flatten_sql(&out);
    }
    if options.terminate {
        out.push(';');
    }
    dialect.rebind(&out)
}

fn is_sql_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n')
}

/// Collapse runs of spaces, tabs, and newlines into single spaces and trim
/// the ends
pub fn flatten_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for word in sql.split(is_sql_space).filter(|word| !word.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Rewrites `?` into `$1`, `$2`, ... outside string literals, quoted
/// identifiers, and `--` line comments
pub fn rebind_numbered(sql: &str) -> String {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum State {
        Start,
        InStringLiteral,
        InQuotedIdentifier,
        InComment,
    }

    let mut out = String::with_capacity(sql.len() + 10);
    let mut next = 1;
    let mut state = State::Start;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            State::Start => match ch {
                '?' => {
                    out.push('$');
                    out.push_str(&next.to_string());
                    next += 1;
                    continue;
                }
                '-' if chars.peek() == Some(&'-') => state = State::InComment,
                '"' => state = State::InQuotedIdentifier,
                '\'' => state = State::InStringLiteral,
                _ => {}
            },
            State::InStringLiteral if ch == '\'' => state = State::Start,
            State::InQuotedIdentifier if ch == '"' => state = State::Start,
            State::InComment if ch == '\n' => state = State::Start,
            _ => {}
        }
        out.push(ch);
    }

    out
}
