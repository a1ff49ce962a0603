use serde::{Deserialize, Serialize};

/// Represents the pagination cursor of a source API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// First request; no paging parameter is sent.
    None,

    /// Row offset (`?offset=N&limit=P` style APIs).
    Offset { offset: usize },

    /// 1-based page number (`?page=N&per_page=P` style APIs).
    Page { page: usize },

    /// Opaque continuation token handed back by the previous page.
    Token { token: String },
}

impl Cursor {
    /// Cursor for the page after one that returned `fetched` records.
    /// Token cursors cannot be advanced locally; the API must supply them.
    pub fn advance(&self, fetched: usize) -> Option<Cursor> {
        match self {
            Cursor::None => None,
            Cursor::Offset { offset } => Some(Cursor::Offset {
                offset: offset + fetched,
            }),
            Cursor::Page { page } => Some(Cursor::Page { page: page + 1 }),
            Cursor::Token { .. } => None,
        }
    }
}

/// How a source pages through its results.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStyle {
    #[default]
    Offset,
    Page,
    Token,
}

impl PaginationStyle {
    pub fn initial(&self) -> Cursor {
        match self {
            PaginationStyle::Offset => Cursor::Offset { offset: 0 },
            PaginationStyle::Page => Cursor::Page { page: 1 },
            PaginationStyle::Token => Cursor::None,
        }
    }
}
