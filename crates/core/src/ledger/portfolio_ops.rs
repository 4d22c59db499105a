use log::info;

use super::apply_engine::applied;
use super::ledger_model::{LedgerOutcome, ValidationFailure, ValidationResult};
use crate::errors::{LedgerError, Result};
use crate::portfolio::{LedgerState, Portfolio};

fn ensure_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidCommand("portfolio name is required".to_string()).into());
    }
    Ok(())
}

pub fn create_portfolio(state: &LedgerState, name: &str) -> Result<(LedgerOutcome, String)> {
    ensure_name(name)?;
    let mut next = state.clone();
    let portfolio = Portfolio::new(name);
    let id = portfolio.id.clone();
    info!("Creating portfolio '{}' ({})", portfolio.name, id);
    next.portfolios.push(portfolio);
    Ok((applied(next, Vec::new(), Vec::new()), id))
}

pub fn rename_portfolio(state: &LedgerState, portfolio_id: &str, name: &str) -> Result<LedgerOutcome> {
    ensure_name(name)?;
    let mut next = state.clone();
    let Some(portfolio) = next.find_portfolio_mut(portfolio_id) else {
        return Ok(LedgerOutcome::no_op(format!("Portfolio {} not found", portfolio_id)));
    };
    if portfolio.name == name.trim() {
        return Ok(LedgerOutcome::no_op("Name unchanged"));
    }
    portfolio.name = name.trim().to_string();
    Ok(applied(next, Vec::new(), Vec::new()))
}

/// Removes a portfolio unless transfers still tie it to another one.
pub fn delete_portfolio(state: &LedgerState, portfolio_id: &str) -> LedgerOutcome {
    let Some(portfolio) = state.find_portfolio(portfolio_id) else {
        return LedgerOutcome::no_op(format!("Portfolio {} not found", portfolio_id));
    };

    let holds_copies_elsewhere = state
        .portfolios
        .iter()
        .filter(|p| p.id != portfolio_id)
        .flat_map(|p| p.assets.iter())
        .flat_map(|a| a.transactions.iter())
        .any(|tx| tx.transferred_from.as_deref() == Some(portfolio_id));
    if holds_copies_elsewhere {
        return LedgerOutcome::Rejected(ValidationResult::fail(
            ValidationFailure::DanglingReference {
                reference: portfolio_id.to_string(),
            },
            format!(
                "Other portfolios hold lots transferred out of '{}'. Delete those transfers first.",
                portfolio.name
            ),
        ));
    }

    let live_incoming = portfolio
        .assets
        .iter()
        .flat_map(|a| a.transactions.iter())
        .filter_map(|tx| Some((tx.transferred_from.as_deref()?, tx.transfer_transaction_id.as_deref()?)))
        .any(|(source_id, transfer_id)| {
            state
                .find_portfolio(source_id)
                .is_some_and(|source| source.find_transaction(transfer_id).is_some())
        });
    if live_incoming {
        return LedgerOutcome::Rejected(ValidationResult::fail(
            ValidationFailure::DanglingReference {
                reference: portfolio_id.to_string(),
            },
            format!(
                "'{}' holds lots transferred in from another portfolio. Delete those transfers at their source first.",
                portfolio.name
            ),
        ));
    }

    let mut next = state.clone();
    next.portfolios.retain(|p| p.id != portfolio_id);
    info!("Deleted portfolio '{}' ({})", portfolio.name, portfolio_id);
    applied(next, Vec::new(), Vec::new())
}
