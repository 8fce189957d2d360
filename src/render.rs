//! Message text and keyboards

use crate::db::{CatalogStats, Item, ItemField};
use crate::dispatcher::{fits, Action, Listing};
use crate::messenger::{Button, Reply};
use crate::state_machine::FlowKind;
use rust_decimal::Decimal;
use std::fmt::Write;

const BUTTONS_PER_ROW: usize = 2;
/// Items per listing page; keeps every page well under Telegram's
/// 4096-character message limit and its keyboard size limit
pub const PAGE_SIZE: usize = 20;
/// Longest search term echoed back in a title
const MAX_TERM_CHARS: usize = 40;

pub fn format_price(price: Decimal) -> String {
    format!("${price:.2}")
}

/// `1. Widget - $9.99 (Electronics)`
pub fn item_line(position: usize, item: &Item) -> String {
    format!(
        "{position}. {} - {} ({})",
        item.name,
        format_price(item.price),
        item.category
    )
}

pub fn flow_label(kind: FlowKind) -> &'static str {
    match kind {
        FlowKind::AddItem => "add item",
        FlowKind::EditItem => "edit item",
        FlowKind::AddCategory => "add category",
    }
}

fn field_label(field: ItemField) -> &'static str {
    match field {
        ItemField::Name => "Name",
        ItemField::Price => "Price",
        ItemField::Category => "Category",
    }
}

/// Button for `action`, or `None` when its payload exceeds the transport limit
fn button(label: impl Into<String>, action: &Action) -> Option<Button> {
    if fits(action) {
        Some(Button::new(label, action.payload()))
    } else {
        tracing::warn!(payload_len = action.payload().len(), "Dropping oversized button");
        None
    }
}

fn grid(buttons: Vec<Button>) -> Vec<Vec<Button>> {
    buttons
        .chunks(BUTTONS_PER_ROW)
        .map(<[Button]>::to_vec)
        .collect()
}

fn with_grid(mut reply: Reply, buttons: Vec<Button>) -> Reply {
    for row in grid(buttons) {
        reply = reply.with_row(row);
    }
    reply
}

fn menu_button() -> Vec<Button> {
    button("⬅️ Menu", &Action::Menu).into_iter().collect()
}

fn admin_button() -> Vec<Button> {
    button("⬅️ Admin", &Action::Admin).into_iter().collect()
}

fn cancel_button() -> Vec<Button> {
    button("❌ Cancel", &Action::Cancel).into_iter().collect()
}

// ============================================================================
// Browsing
// ============================================================================

pub fn main_menu(is_admin: bool) -> Reply {
    let mut buttons: Vec<Button> = [
        ("📋 List items", Action::List),
        ("🔤 Sort A–Z", Action::Sort),
        ("🗂 Filter by category", Action::Filter),
        ("🔎 Search", Action::SearchPrompt),
    ]
    .iter()
    .filter_map(|(label, action)| button(*label, action))
    .collect();
    if is_admin {
        buttons.extend(button("🛠 Admin Panel", &Action::Admin));
    }
    with_grid(Reply::text("👋 Welcome to the catalog! Choose an option:"), buttons)
}

/// Clamp `page` to the listing and slice out its items
fn paginate(items: &[Item], page: usize) -> (usize, usize, &[Item]) {
    let pages = items.len().div_ceil(PAGE_SIZE).max(1);
    let page = page.min(pages - 1);
    let shown = items.chunks(PAGE_SIZE).nth(page).unwrap_or_default();
    (page, pages, shown)
}

fn page_title(title: &str, page: usize, pages: usize) -> String {
    if pages > 1 {
        format!("{title} (page {}/{pages})", page + 1)
    } else {
        title.to_string()
    }
}

fn nav_row(listing: &Listing, page: usize, pages: usize) -> Vec<Button> {
    let mut row = Vec::new();
    if page > 0 {
        row.extend(button("◀️ Prev", &Action::Page(listing.clone(), page - 1)));
    }
    if page + 1 < pages {
        row.extend(button("Next ▶️", &Action::Page(listing.clone(), page + 1)));
    }
    row
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars).collect();
    short.push('…');
    short
}

/// One page of a numbered listing, or `empty` when there is nothing to show.
/// A `page` past the end shows the last page.
pub fn item_list(
    title: &str,
    items: &[Item],
    empty: &str,
    listing: &Listing,
    page: usize,
) -> Reply {
    if items.is_empty() {
        return Reply::text(empty).with_row(menu_button());
    }

    let (page, pages, shown) = paginate(items, page);
    let mut text = format!("{}\n", page_title(title, page, pages));
    for (i, item) in shown.iter().enumerate() {
        let _ = write!(text, "\n{}", item_line(page * PAGE_SIZE + i + 1, item));
    }
    Reply::text(text)
        .with_row(nav_row(listing, page, pages))
        .with_row(menu_button())
}

pub fn category_filter(categories: &[String]) -> Reply {
    if categories.is_empty() {
        return Reply::text("📭 No categories yet.").with_row(menu_button());
    }
    let buttons = categories
        .iter()
        .filter_map(|name| button(name.clone(), &Action::Browse(name.clone())))
        .collect();
    with_grid(Reply::text("🗂 Pick a category:"), buttons).with_row(menu_button())
}

/// Plain notice with a way back to the menu
pub fn with_menu(text: impl Into<String>) -> Reply {
    Reply::text(text).with_row(menu_button())
}

pub fn search_prompt() -> Reply {
    Reply::text("🔎 Send me part of an item name.").with_row(menu_button())
}

pub fn search_results(term: &str, items: &[Item], page: usize) -> Reply {
    let shown = shorten(term, MAX_TERM_CHARS);
    item_list(
        &format!("🔎 Results for '{shown}':"),
        items,
        &format!("🔎 No items found for '{shown}'."),
        &Listing::Search(term.to_string()),
        page,
    )
}

pub fn help(is_admin: bool) -> Reply {
    let mut text = String::from(
        "ℹ️ Commands\n\
         /start - main menu\n\
         /search <text> - find items by name\n\
         /cancel - abandon the current step\n\
         /help - this message",
    );
    if is_admin {
        text.push_str(
            "\n\n🛠 Admin\n\
             /admin - admin panel\n\
             /add - add an item step by step\n\
             /add <name> <price> <category> - add an item at once\n\
             /addcategory - add a category\n\
             /stats - catalog statistics",
        );
    }
    Reply::text(text).with_row(menu_button())
}

// ============================================================================
// Guided flows
// ============================================================================

/// Free-text prompt with a cancel button
pub fn prompt(text: impl Into<String>) -> Reply {
    Reply::text(text).with_row(cancel_button())
}

pub fn category_choice(text: impl Into<String>, categories: &[String]) -> Reply {
    let buttons = categories
        .iter()
        .filter_map(|name| button(name.clone(), &Action::PickCategory(name.clone())))
        .collect();
    with_grid(Reply::text(text), buttons)
        .with_row(button("🆕 New category", &Action::NewCategory).into_iter().collect())
        .with_row(cancel_button())
}

pub fn field_choice(text: impl Into<String>) -> Reply {
    let buttons = ItemField::ALL
        .iter()
        .filter_map(|field| button(field_label(*field), &Action::Field(*field)))
        .collect();
    with_grid(Reply::text(text), buttons).with_row(cancel_button())
}

pub fn expired(kind: FlowKind) -> Reply {
    Reply::text(format!(
        "⌛ Your {} session expired after inactivity. Nothing was saved.",
        flow_label(kind)
    ))
    .with_row(menu_button())
}

// ============================================================================
// Admin
// ============================================================================

pub fn admin_panel() -> Reply {
    let buttons = [
        ("➕ Add product", Action::AddItem),
        ("🏷 Add category", Action::AddCategory),
        ("✏️ Manage items", Action::Manage),
        ("📊 Stats", Action::Stats),
    ]
    .iter()
    .filter_map(|(label, action)| button(*label, action))
    .collect();
    with_grid(Reply::text("🛠 Admin panel"), buttons).with_row(menu_button())
}

/// One page of items with edit and delete buttons per item
pub fn manage_items(items: &[Item], page: usize) -> Reply {
    if items.is_empty() {
        return Reply::text("📭 No items to manage.").with_row(admin_button());
    }

    let (page, pages, shown) = paginate(items, page);
    let title = format!("✏️ {} item(s). Pick one to edit or delete:", items.len());
    let mut reply = Reply::text(page_title(&title, page, pages));
    for item in shown {
        let row = [
            button(format!("✏️ {}", item.name), &Action::EditItem(item.id.clone())),
            button("🗑", &Action::Delete(item.id.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();
        reply = reply.with_row(row);
    }
    reply
        .with_row(nav_row(&Listing::Manage, page, pages))
        .with_row(admin_button())
}

pub fn stats(stats: &CatalogStats) -> Reply {
    let mut text = format!(
        "📊 Catalog stats\nItems: {}\nCategories: {}\nTotal value: {}\n",
        stats.total_items,
        stats.total_categories,
        format_price(stats.total_value)
    );
    for (category, count) in &stats.per_category {
        let _ = write!(text, "\n• {category}: {count}");
    }
    Reply::text(text).with_row(admin_button())
}
