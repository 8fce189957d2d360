//! Button payload codec
//!
//! Payloads are short `verb` or `verb:argument` strings. Telegram caps
//! callback data at 64 bytes, which bounds argument length.

use crate::db::ItemField;

/// Transport limit on a button payload
pub const MAX_PAYLOAD_BYTES: usize = 64;

/// A paginated view; page 0 of each is reachable through its plain action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    All,
    Sorted,
    Category(String),
    Search(String),
    Manage,
}

impl Listing {
    fn parse(raw: &str) -> Option<Self> {
        match raw.split_once(':') {
            None => match raw {
                "list" => Some(Listing::All),
                "sort" => Some(Listing::Sorted),
                "manage" => Some(Listing::Manage),
                _ => None,
            },
            Some(("cat", name)) if !name.is_empty() => Some(Listing::Category(name.to_string())),
            Some(("find", term)) if !term.is_empty() => Some(Listing::Search(term.to_string())),
            Some(_) => None,
        }
    }

    fn payload(&self) -> String {
        match self {
            Listing::All => "list".to_string(),
            Listing::Sorted => "sort".to_string(),
            Listing::Category(name) => format!("cat:{name}"),
            Listing::Search(term) => format!("find:{term}"),
            Listing::Manage => "manage".to_string(),
        }
    }
}

/// Everything a button can ask for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Stateless browsing
    Menu,
    List,
    Sort,
    Filter,
    Browse(String),
    SearchPrompt,
    /// Later page of a listing
    Page(Listing, usize),

    // Privileged stateless
    Admin,
    Stats,
    Manage,
    Delete(String),

    // Flow-entry triggers (privileged)
    AddItem,
    EditItem(String),
    AddCategory,

    // Flow input
    PickCategory(String),
    NewCategory,
    Field(ItemField),
    Cancel,

    /// Payload we do not understand (stale keyboard, tampered data)
    Unrecognized(String),
}

impl Action {
    pub fn parse(payload: &str) -> Self {
        let (verb, arg) = match payload.split_once(':') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (payload, None),
        };

        match (verb, arg) {
            ("menu", None) => Action::Menu,
            ("list", None) => Action::List,
            ("sort", None) => Action::Sort,
            ("filter", None) => Action::Filter,
            ("cat", Some(name)) if !name.is_empty() => Action::Browse(name.to_string()),
            ("search", None) => Action::SearchPrompt,
            ("pg", Some(rest)) => rest
                .split_once(':')
                .and_then(|(page, listing)| {
                    Some(Action::Page(Listing::parse(listing)?, page.parse().ok()?))
                })
                .unwrap_or_else(|| Action::Unrecognized(payload.to_string())),
            ("admin", None) => Action::Admin,
            ("stats", None) => Action::Stats,
            ("manage", None) => Action::Manage,
            ("del", Some(id)) if !id.is_empty() => Action::Delete(id.to_string()),
            ("add_item", None) => Action::AddItem,
            ("edit", Some(id)) if !id.is_empty() => Action::EditItem(id.to_string()),
            ("add_cat", None) => Action::AddCategory,
            ("pick", Some(name)) if !name.is_empty() => Action::PickCategory(name.to_string()),
            ("new_cat", None) => Action::NewCategory,
            ("field", Some(field)) => ItemField::parse(field)
                .map_or_else(|| Action::Unrecognized(payload.to_string()), Action::Field),
            ("cancel", None) => Action::Cancel,
            _ => Action::Unrecognized(payload.to_string()),
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Action::Menu => "menu".to_string(),
            Action::List => "list".to_string(),
            Action::Sort => "sort".to_string(),
            Action::Filter => "filter".to_string(),
            Action::Browse(name) => format!("cat:{name}"),
            Action::SearchPrompt => "search".to_string(),
            Action::Page(listing, page) => format!("pg:{page}:{}", listing.payload()),
            Action::Admin => "admin".to_string(),
            Action::Stats => "stats".to_string(),
            Action::Manage => "manage".to_string(),
            Action::Delete(id) => format!("del:{id}"),
            Action::AddItem => "add_item".to_string(),
            Action::EditItem(id) => format!("edit:{id}"),
            Action::AddCategory => "add_cat".to_string(),
            Action::PickCategory(name) => format!("pick:{name}"),
            Action::NewCategory => "new_cat".to_string(),
            Action::Field(field) => format!("field:{field}"),
            Action::Cancel => "cancel".to_string(),
            Action::Unrecognized(raw) => raw.clone(),
        }
    }

    /// Starts a conversation, superseding any active one
    pub fn is_flow_entry(&self) -> bool {
        matches!(
            self,
            Action::AddItem | Action::EditItem(_) | Action::AddCategory
        )
    }

    /// Requires the acting user to be on the allow-list
    pub fn is_privileged(&self) -> bool {
        self.is_flow_entry()
            || matches!(
                self,
                Action::Admin
                    | Action::Stats
                    | Action::Manage
                    | Action::Delete(_)
                    | Action::Page(Listing::Manage, _)
            )
    }
}

/// Whether `action` encodes within the transport limit
pub fn fits(action: &Action) -> bool {
    action.payload().len() <= MAX_PAYLOAD_BYTES
}
