//! Stateless actions: browsing, search and admin views

use super::{Action, Dispatcher, Intent, Listing, Route};
use crate::db::NewItem;
use crate::messenger::{Reply, UserId};
use crate::render;
use crate::runtime::{AccessPolicy, CatalogError, CatalogStore, Messenger, Outbox};
use crate::state_machine::{parse_price, validate_category_name, validate_item_name};
use chrono::Utc;

const DIRECT_ADD_USAGE: &str = "Usage: /add <name> <price> <category>\nExample: /add Widget 9.99 Electronics\nOr send /add alone to be guided step by step.";

impl<C, M, P> Dispatcher<C, M, P>
where
    C: CatalogStore + 'static,
    M: Messenger + 'static,
    P: AccessPolicy,
{
    pub(super) async fn run_stateless(
        &self,
        user_id: UserId,
        intent: Intent,
        outbox: &mut Outbox,
    ) -> Route {
        let is_admin = self.policy.is_privileged(user_id);
        let privileged = match &intent {
            Intent::Action(action) => action.is_privileged(),
            Intent::DirectAdd(_) => true,
            _ => false,
        };
        if privileged && !is_admin {
            tracing::info!(user_id = %user_id, ?intent, "Privileged action refused");
            self.deny(outbox).await;
            return Route::Denied;
        }

        let reply = match self.stateless_reply(intent, is_admin).await {
            Ok(reply) => reply,
            Err(e) => {
                self.report_unavailable(&e, outbox).await;
                return Route::Unavailable;
            }
        };
        outbox.deliver(self.runtime.messenger(), reply).await;
        Route::Stateless
    }

    async fn stateless_reply(&self, intent: Intent, is_admin: bool) -> Result<Reply, CatalogError> {
        let catalog = self.runtime.catalog();

        let reply = match intent {
            Intent::Action(Action::Menu) => render::main_menu(is_admin),

            Intent::Action(Action::List) => self.listing(&Listing::All, 0).await?,

            Intent::Action(Action::Sort) => self.listing(&Listing::Sorted, 0).await?,

            Intent::Action(Action::Filter) => {
                render::category_filter(&catalog.list_categories().await?)
            }

            Intent::Action(Action::Browse(category)) => {
                self.listing(&Listing::Category(category), 0).await?
            }

            Intent::Action(Action::Page(listing, page)) => self.listing(&listing, page).await?,

            Intent::Action(Action::SearchPrompt) => render::search_prompt(),

            Intent::Search(term) | Intent::Text(term) => {
                let term = term.trim().to_string();
                if term.is_empty() {
                    render::search_prompt()
                } else {
                    self.listing(&Listing::Search(term), 0).await?
                }
            }

            Intent::Action(Action::Admin) => render::admin_panel(),

            Intent::Action(Action::Stats) => render::stats(&catalog.stats().await?),

            Intent::Action(Action::Manage) => self.listing(&Listing::Manage, 0).await?,

            Intent::Action(Action::Delete(item_id)) => match catalog.delete_item(&item_id).await {
                Ok(()) => {
                    tracing::info!(item_id = %item_id, "Item deleted");
                    let mut reply = render::manage_items(&catalog.list_items().await?, 0);
                    reply.text = format!("🗑 Item deleted.\n\n{}", reply.text);
                    reply
                }
                Err(CatalogError::NotFound(_)) => {
                    render::with_menu("⚠️ That item no longer exists.")
                }
                Err(e) => return Err(e),
            },

            Intent::DirectAdd(args) => self.direct_add(&args).await?,

            Intent::Help => render::help(is_admin),

            Intent::UnknownCommand(name) => {
                render::with_menu(format!("Unknown command /{name}. Try /help."))
            }

            // Flow inputs arriving with no active flow come from an old keyboard
            Intent::Action(
                Action::PickCategory(_)
                | Action::NewCategory
                | Action::Field(_)
                | Action::Unrecognized(_),
            ) => render::with_menu("⌛ That button has expired."),

            // Routed before stateless handling
            Intent::Action(
                Action::Cancel | Action::AddItem | Action::EditItem(_) | Action::AddCategory,
            ) => render::main_menu(is_admin),
        };
        Ok(reply)
    }

    /// One page of a listing
    async fn listing(&self, listing: &Listing, page: usize) -> Result<Reply, CatalogError> {
        let catalog = self.runtime.catalog();
        let reply = match listing {
            Listing::All => render::item_list(
                "📋 All items:",
                &catalog.list_items().await?,
                "📭 The catalog is empty.",
                listing,
                page,
            ),
            Listing::Sorted => render::item_list(
                "🔤 Items by name:",
                &catalog.list_items_sorted().await?,
                "📭 The catalog is empty.",
                listing,
                page,
            ),
            Listing::Category(category) => render::item_list(
                &format!("🗂 {category}:"),
                &catalog.items_in_category(category).await?,
                &format!("📭 No items in {category}."),
                listing,
                page,
            ),
            Listing::Search(term) => {
                render::search_results(term, &catalog.search_items(term).await?, page)
            }
            Listing::Manage => render::manage_items(&catalog.list_items().await?, page),
        };
        Ok(reply)
    }

    /// `/add <name> <price> <category...>`: insert into an existing category
    /// in one step
    async fn direct_add(&self, args: &[String]) -> Result<Reply, CatalogError> {
        let [name, price, category @ ..] = args else {
            return Ok(Reply::text(DIRECT_ADD_USAGE));
        };
        if category.is_empty() {
            return Ok(Reply::text(DIRECT_ADD_USAGE));
        }

        let checked = validate_item_name(name).and_then(|name| {
            let price = parse_price(price)?;
            let category = validate_category_name(&category.join(" "))?;
            Ok((name, price, category))
        });
        let (name, price, category) = match checked {
            Ok(values) => values,
            Err(e) => return Ok(Reply::text(format!("⚠️ {e}\n\n{DIRECT_ADD_USAGE}"))),
        };

        let new_item = NewItem {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            price,
            category,
            create_category: false,
            added_at: Utc::now(),
        };
        match self.runtime.catalog().insert_item(new_item).await {
            Ok(item) => {
                tracing::info!(item_id = %item.id, "Item added directly");
                Ok(render::with_menu(format!(
                    "✅ Added {} - {} ({})",
                    item.name,
                    render::format_price(item.price),
                    item.category
                )))
            }
            Err(CatalogError::UnknownCategory(name)) => {
                let known = self.runtime.catalog().list_categories().await?;
                Ok(Reply::text(format!(
                    "⚠️ Unknown category '{name}'. Known categories: {}",
                    known.join(", ")
                )))
            }
            Err(CatalogError::Invalid(reason)) => Ok(Reply::text(format!("⚠️ {reason}"))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatcher::Route;
    use crate::runtime::testing::{TestBot, ADMIN, VISITOR};
    use crate::runtime::CatalogStore;

    #[tokio::test]
    async fn test_list_in_insertion_order() {
        let bot = TestBot::new();
        bot.seed_item("Zebra lamp", "30", "Home").await;
        bot.seed_item("Apple pie", "4.5", "Other").await;

        assert_eq!(bot.press(VISITOR, "list").await, Route::Stateless);
        let text = bot.last_text();
        assert!(text.contains("1. Zebra lamp - $30.00 (Home)"));
        assert!(text.contains("2. Apple pie - $4.50 (Other)"));

        bot.press(VISITOR, "sort").await;
        let text = bot.last_text();
        assert!(text.contains("1. Apple pie"));
        assert!(text.contains("2. Zebra lamp"));
    }

    #[tokio::test]
    async fn test_long_listing_pages() {
        let bot = TestBot::new();
        for i in 0..45 {
            bot.seed_item(&format!("Item {i:02}"), "1", "Other").await;
        }

        bot.press(VISITOR, "list").await;
        let first = bot.messenger.last_reply().unwrap();
        assert!(first.text.contains("(page 1/3)"));
        assert!(first.text.contains("20. Item 19"));
        assert!(!first.text.contains("Item 20"));
        assert!(first.payloads().contains(&"pg:1:list"));

        assert_eq!(bot.press(VISITOR, "pg:2:list").await, Route::Stateless);
        let last = bot.last_text();
        assert!(last.contains("(page 3/3)"));
        assert!(last.contains("45. Item 44"));

        bot.text(VISITOR, "item").await;
        assert!(bot
            .messenger
            .last_reply()
            .unwrap()
            .payloads()
            .contains(&"pg:1:find:item"));

        assert_eq!(bot.press(VISITOR, "pg:1:manage").await, Route::Denied);
        assert_eq!(bot.press(ADMIN, "pg:1:manage").await, Route::Stateless);
        assert!(bot.last_text().contains("(page 2/3)"));
    }

    #[tokio::test]
    async fn test_empty_catalog_message() {
        let bot = TestBot::new();
        bot.press(VISITOR, "list").await;
        assert_eq!(bot.last_text(), "📭 The catalog is empty.");
    }

    #[tokio::test]
    async fn test_browse_category() {
        let bot = TestBot::new();
        bot.seed_item("Novel", "12", "Books").await;
        bot.seed_item("Shirt", "20", "Clothing").await;

        bot.press(VISITOR, "filter").await;
        assert!(bot
            .messenger
            .last_reply()
            .unwrap()
            .payloads()
            .contains(&"cat:Books"));

        bot.press(VISITOR, "cat:Books").await;
        let text = bot.last_text();
        assert!(text.contains("Novel"));
        assert!(!text.contains("Shirt"));
    }

    #[tokio::test]
    async fn test_free_text_searches() {
        let bot = TestBot::new();
        bot.seed_item("Red Widget", "1", "Other").await;
        bot.seed_item("Blue gadget", "2", "Other").await;

        bot.text(VISITOR, "widget").await;
        let text = bot.last_text();
        assert!(text.contains("Red Widget"));
        assert!(!text.contains("Blue gadget"));

        bot.text(VISITOR, "/search GADGET").await;
        assert!(bot.last_text().contains("Blue gadget"));

        bot.text(VISITOR, "nothing-like-this").await;
        assert!(bot.last_text().contains("No items found"));
    }

    #[tokio::test]
    async fn test_admin_views_are_privileged() {
        let bot = TestBot::new();
        for payload in ["admin", "stats", "manage"] {
            assert_eq!(bot.press(VISITOR, payload).await, Route::Denied);
            assert!(bot.last_text().contains("not authorized"));
        }
        assert_eq!(bot.press(ADMIN, "admin").await, Route::Stateless);
        assert!(bot.last_text().contains("Admin panel"));
    }

    #[tokio::test]
    async fn test_stats_view() {
        let bot = TestBot::new();
        bot.seed_item("Novel", "12.50", "Books").await;
        bot.seed_item("Atlas", "7.50", "Books").await;

        bot.text(ADMIN, "/stats").await;
        let text = bot.last_text();
        assert!(text.contains("Items: 2"));
        assert!(text.contains("Total value: $20.00"));
        assert!(text.contains("• Books: 2"));
    }

    #[tokio::test]
    async fn test_delete_from_manage_view() {
        let bot = TestBot::new();
        let item = bot.seed_item("Lamp", "20", "Home").await;

        assert_eq!(
            bot.press(VISITOR, &format!("del:{}", item.id)).await,
            Route::Denied
        );
        assert_eq!(bot.catalog.list_items().await.unwrap().len(), 1);

        bot.press(ADMIN, &format!("del:{}", item.id)).await;
        assert!(bot.last_text().contains("Item deleted"));
        assert!(bot.catalog.list_items().await.unwrap().is_empty());

        bot.press(ADMIN, &format!("del:{}", item.id)).await;
        assert!(bot.last_text().contains("no longer exists"));
    }

    #[tokio::test]
    async fn test_direct_add() {
        let bot = TestBot::new();

        assert_eq!(bot.text(VISITOR, "/add Lamp 20 Home").await, Route::Denied);

        bot.text(ADMIN, "/add Lamp 20 home").await;
        assert!(bot.last_text().contains("Added Lamp - $20.00 (Home)"));

        bot.text(ADMIN, "/add Lamp twenty Home").await;
        assert!(bot.last_text().contains("not a valid price"));

        bot.text(ADMIN, "/add Lamp 20 Garden").await;
        assert!(bot.last_text().contains("Unknown category 'Garden'"));

        bot.text(ADMIN, "/add Lamp").await;
        assert!(bot.last_text().starts_with("Usage"));

        assert_eq!(bot.catalog.list_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_reported() {
        let bot = TestBot::new();
        bot.catalog.fail_reads(true);
        assert_eq!(bot.press(VISITOR, "list").await, Route::Unavailable);
        assert!(bot.last_text().contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_stale_flow_button_without_flow() {
        let bot = TestBot::new();
        assert_eq!(bot.press(ADMIN, "pick:Books").await, Route::Stateless);
        assert!(bot.last_text().contains("expired"));
        assert!(bot.conversation(ADMIN).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_command_and_help() {
        let bot = TestBot::new();
        bot.text(VISITOR, "/frobnicate").await;
        assert!(bot.last_text().contains("Unknown command /frobnicate"));

        bot.text(VISITOR, "/help").await;
        assert!(!bot.last_text().contains("/addcategory"));
        bot.text(ADMIN, "/help").await;
        assert!(bot.last_text().contains("/addcategory"));
    }
}
