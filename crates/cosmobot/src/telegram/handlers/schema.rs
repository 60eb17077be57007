//! Dispatcher schema and handler chain builders

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::callbacks::handle_menu_callback;
use super::commands::{
    handle_balance_command, handle_buy_command, handle_inventory_command, handle_start_command, open_case_and_report,
};
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::bot::Command;
use crate::telegram::payments;
use crate::telegram::Bot;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// This function returns a handler tree that can be used with teloxide's
/// Dispatcher. The same schema is used in production and in integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_payment = deps.clone();
    let deps_commands = deps.clone();
    let deps_precheckout = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Successful payment handler must be first
        .branch(successful_payment_handler(deps_payment))
        // Command handler
        .branch(command_handler(deps_commands))
        // Pre-checkout query handler
        .branch(pre_checkout_handler(deps_precheckout))
        // Callback query handler
        .branch(callback_handler(deps_callback))
}

/// Handler for successful Telegram payments
fn successful_payment_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.successful_payment().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                log::info!("Received successful_payment message");

                if let Err(e) = payments::handle_successful_payment(&bot, &msg, Arc::clone(&deps.ledger)).await {
                    log::error!("Failed to handle successful payment: {:?}", e);
                }
                Ok(())
            }
        })
}

/// Handler for bot commands (/start, /balance, /inventory, /buy, /open)
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);

                match cmd {
                    Command::Start => {
                        handle_start_command(&bot, &msg, &deps).await?;
                    }
                    Command::Balance => {
                        handle_balance_command(&bot, &msg, &deps).await?;
                    }
                    Command::Inventory => {
                        handle_inventory_command(&bot, &msg, &deps).await?;
                    }
                    Command::Buy => {
                        handle_buy_command(&bot, &msg).await?;
                    }
                    Command::Open => {
                        open_case_and_report(&bot, msg.chat.id, &deps).await?;
                    }
                }
                Ok(())
            }
        },
    ))
}

/// Handler for pre-checkout queries (Telegram payments)
fn pre_checkout_handler(_deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_pre_checkout_query().endpoint(move |bot: Bot, query: teloxide::types::PreCheckoutQuery| async move {
        let query_id = query.id;
        let payload = query.invoice_payload;

        log::info!("Received pre_checkout_query: id={}, payload={}", query_id, payload);

        if payments::parse_topup_payload(&payload).is_some() {
            match bot.answer_pre_checkout_query(query_id, true).await {
                Ok(_) => log::info!("✅ Pre-checkout query approved for payload: {}", payload),
                Err(e) => log::error!("Failed to answer pre_checkout_query: {:?}", e),
            }
        } else {
            // Reject unknown payment types
            match bot
                .answer_pre_checkout_query(query_id, false)
                .error_message("Неизвестный тип платежа")
                .await
            {
                Ok(_) => log::info!("Pre-checkout query rejected for payload: {}", payload),
                Err(e) => log::error!("Failed to answer pre_checkout_query: {:?}", e),
            }
        }
        Ok(())
    })
}

/// Handler for callback queries (inline keyboard buttons)
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move { handle_menu_callback(bot, q, deps).await }
    })
}
