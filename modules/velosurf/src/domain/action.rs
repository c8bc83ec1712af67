//! Actions: named parametrized updates owned by an entity
//!
//! A transaction action holds several `;`-separated statements that are
//! committed together or not at all.

use crate::contract::Result;
use super::database::Database;
use super::query::{ParamSource, QueryTemplate};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum ActionBody {
    Statement(QueryTemplate),
    Transaction(Vec<QueryTemplate>),
}

#[derive(Debug)]
pub struct Action {
    name: String,
    pub(crate) owner: String,
    body: ActionBody,
}

impl Action {
    /// Single statement with inline `:name` parameters
    pub fn new(name: impl Into<String>, query: &str) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            body: ActionBody::Statement(QueryTemplate::parse(query)),
        }
    }

    /// Several statements separated by `;`, each with its own parameters
    pub fn transaction(name: impl Into<String>, block: &str) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            body: ActionBody::Transaction(QueryTemplate::split_statements(block)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self.body, ActionBody::Transaction(_))
    }

    pub fn statements(&self) -> &[QueryTemplate] {
        match &self.body {
            ActionBody::Statement(template) => std::slice::from_ref(template),
            ActionBody::Transaction(templates) => templates,
        }
    }

    /// Run the action with parameters read from `source`; returns the number
    /// of affected rows (summed over a transaction's statements)
    pub async fn perform(&self, db: &Database, source: &dyn ParamSource) -> Result<u64> {
        let owner = format!("{}.{}", self.owner, self.name);
        match &self.body {
            ActionBody::Statement(template) => {
                let params = template.bind(source, &owner);
                db.repository().execute(template.sql(), &params).await
            }
            ActionBody::Transaction(templates) => {
                let statements = templates
                    .iter()
                    .map(|t| t.bind_statement(source, &owner))
                    .collect::<Vec<_>>();
                debug!(action = %owner, statements = statements.len(), "performing transaction");
                db.repository().execute_transaction(&statements).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_splits_statements() {
        let action = Action::transaction(
            "transfer",
            "update account set balance = balance - :amount where id = :from;\
             update account set balance = balance + :amount where id = :to",
        );
        assert!(action.is_transaction());
        assert_eq!(action.statements().len(), 2);
        assert_eq!(
            action.statements()[1].params(),
            &["amount".to_string(), "to".to_string()]
        );
    }

    #[test]
    fn test_single_statement() {
        let action = Action::new("touch", "update person set seen = 1 where id = :id");
        assert!(!action.is_transaction());
        assert_eq!(action.statements().len(), 1);
    }
}
