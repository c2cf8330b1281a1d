//! Predicate to SQL renderer

use super::{escape_like, SqlDialect, SqlFragment, SqlParam};
use crate::error::{Result, RuntimeError};
use crm_rules_core::{
    CompareOp, CompareValue, ComparisonMode, EventPropertyCheck, ExistenceCheck, Predicate,
    RecordCondition, RecordField, RelationKind, Value,
};

const CONTACTS: &str = "fc_subscribers";
const CONTACT_RELATIONS: &str = "fc_contact_relations";
const SUBSCRIPTIONS: &str = "edd_subscriptions";
const CUSTOMERS: &str = "edd_customers";
const COMMENTS: &str = "comments";
const EVENTS: &str = "fc_event_tracking";

/// Renders predicates into `WHERE` fragments over the contacts table
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    dialect: SqlDialect,
    table_prefix: String,
}

impl Default for SqlRenderer {
    fn default() -> Self {
        Self::new(SqlDialect::MySql, "wp_")
    }
}

impl SqlRenderer {
    pub fn new(dialect: SqlDialect, table_prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            table_prefix: table_prefix.into(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Quoted, prefixed table name
    pub fn table(&self, name: &str) -> String {
        self.dialect.quote(&format!("{}{}", self.table_prefix, name))
    }

    fn col(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", alias, self.dialect.quote(column))
    }

    fn contact_col(&self, column: &str) -> String {
        format!("{}.{}", self.table(CONTACTS), self.dialect.quote(column))
    }

    /// Render a predicate as a boolean SQL expression
    pub fn render(&self, predicate: &Predicate) -> Result<SqlFragment> {
        let mut out = SqlFragment::default();
        self.write_predicate(predicate, &mut out)?;
        Ok(out)
    }

    /// `SELECT` of the ids of every contact satisfying the predicate
    pub fn render_contact_query(&self, predicate: &Predicate) -> Result<SqlFragment> {
        let mut out = SqlFragment::new(format!(
            "SELECT {} FROM {} WHERE ",
            self.contact_col("id"),
            self.table(CONTACTS)
        ));
        self.write_predicate(predicate, &mut out)?;
        Ok(out)
    }

    /// `SELECT EXISTS(...)` testing the predicate for one contact id
    pub fn render_subject_check(&self, predicate: &Predicate, subscriber_id: u64) -> Result<SqlFragment> {
        let mut out = SqlFragment::new(format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ? AND ",
            self.table(CONTACTS),
            self.contact_col("id")
        ));
        out.params.push(subscriber_id.into());
        self.write_predicate(predicate, &mut out)?;
        out.sql.push(')');
        Ok(out)
    }

    fn write_predicate(&self, predicate: &Predicate, out: &mut SqlFragment) -> Result<()> {
        match predicate {
            Predicate::Exists(check) => self.write_exists(check, out),
            Predicate::EventProperty(check) => self.write_event_property(check, out),
            Predicate::NoLinkedAccount { provider } => {
                out.sql.push_str(&format!(
                    "NOT EXISTS (SELECT 1 FROM {} AS rel WHERE {} = {} AND {} = ?)",
                    self.table(CONTACT_RELATIONS),
                    self.col("rel", "subscriber_id"),
                    self.contact_col("id"),
                    self.col("rel", "provider"),
                ));
                out.params.push(provider.as_str().into());
                Ok(())
            }
            Predicate::Not(inner) => {
                out.sql.push_str("NOT (");
                self.write_predicate(inner, out)?;
                out.sql.push(')');
                Ok(())
            }
            Predicate::All(items) => self.write_junction(items, " AND ", "1 = 1", out),
            Predicate::Any(items) => self.write_junction(items, " OR ", "1 = 0", out),
        }
    }

    fn write_junction(
        &self,
        items: &[Predicate],
        separator: &str,
        empty: &str,
        out: &mut SqlFragment,
    ) -> Result<()> {
        if items.is_empty() {
            out.sql.push_str(empty);
            return Ok(());
        }
        out.sql.push('(');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.sql.push_str(separator);
            }
            self.write_predicate(item, out)?;
        }
        out.sql.push(')');
        Ok(())
    }

    fn write_exists(&self, check: &ExistenceCheck, out: &mut SqlFragment) -> Result<()> {
        match check.relation {
            RelationKind::ActiveSubscription => {
                let provider = check.relation.link_provider().unwrap_or("edd");
                out.sql.push_str(&format!(
                    "EXISTS (SELECT 1 FROM {} AS sub JOIN {} AS cust ON {} = {} WHERE {} = (SELECT {} FROM {} AS rel WHERE {} = {} AND {} = ? LIMIT 1) AND ",
                    self.table(SUBSCRIPTIONS),
                    self.table(CUSTOMERS),
                    self.col("cust", "id"),
                    self.col("sub", "customer_id"),
                    self.col("cust", "id"),
                    self.col("rel", "provider_id"),
                    self.table(CONTACT_RELATIONS),
                    self.col("rel", "subscriber_id"),
                    self.contact_col("id"),
                    self.col("rel", "provider"),
                ));
                out.params.push(provider.into());
            }
            RelationKind::LeftReview => {
                out.sql.push_str(&format!(
                    "EXISTS (SELECT 1 FROM {} AS c WHERE (({uid} > 0 AND {uid} = {cuid}) OR ({uid} = 0 AND {cemail} <> '' AND {email} = {cemail})) AND ",
                    self.table(COMMENTS),
                    uid = self.col("c", "user_id"),
                    cuid = self.contact_col("user_id"),
                    email = self.col("c", "comment_author_email"),
                    cemail = self.contact_col("email"),
                ));
            }
            RelationKind::EventJsonProperty => {
                return Err(RuntimeError::UnsupportedPredicate(
                    "existence checks on event properties".to_string(),
                ))
            }
        }
        self.write_condition(check.relation, &check.condition, out)?;
        out.sql.push(')');
        Ok(())
    }

    fn record_column(&self, relation: RelationKind, field: RecordField) -> Result<String> {
        let column = match (relation, field) {
            (RelationKind::ActiveSubscription, RecordField::ProductId) => self.col("sub", "product_id"),
            (RelationKind::ActiveSubscription, RecordField::VariantId) => self.col("sub", "price_id"),
            (RelationKind::ActiveSubscription, RecordField::Status) => self.col("sub", "status"),
            (RelationKind::LeftReview, RecordField::ProductId) => self.col("c", "comment_post_ID"),
            (RelationKind::LeftReview, RecordField::Status) => self.col("c", "comment_approved"),
            (RelationKind::LeftReview, RecordField::Kind) => self.col("c", "comment_type"),
            (relation, field) => {
                return Err(RuntimeError::UnsupportedPredicate(format!(
                    "field {:?} on relation {}",
                    field, relation
                )))
            }
        };
        Ok(column)
    }

    fn write_condition(
        &self,
        relation: RelationKind,
        condition: &RecordCondition,
        out: &mut SqlFragment,
    ) -> Result<()> {
        match condition {
            RecordCondition::Eq(field, value) => {
                let column = self.record_column(relation, *field)?;
                out.sql.push_str(&format!("{} = ?", column));
                out.params.push(bind_value(value)?);
            }
            RecordCondition::Unset(field) => {
                let column = self.record_column(relation, *field)?;
                out.sql
                    .push_str(&format!("({column} IS NULL OR {column} = 0)", column = column));
            }
            RecordCondition::All(items) | RecordCondition::Any(items) => {
                let (separator, empty) = if matches!(condition, RecordCondition::All(_)) {
                    (" AND ", "1 = 1")
                } else {
                    (" OR ", "1 = 0")
                };
                if items.is_empty() {
                    out.sql.push_str(empty);
                    return Ok(());
                }
                out.sql.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.sql.push_str(separator);
                    }
                    self.write_condition(relation, item, out)?;
                }
                out.sql.push(')');
            }
        }
        Ok(())
    }

    fn write_event_property(&self, check: &EventPropertyCheck, out: &mut SqlFragment) -> Result<()> {
        out.sql.push_str(&format!(
            "EXISTS (SELECT 1 FROM {} AS et WHERE {} = {} AND {} = ? AND ",
            self.table(EVENTS),
            self.col("et", "subscriber_id"),
            self.contact_col("id"),
            self.col("et", "event_key"),
        ));
        out.params.push(check.event_key.as_str().into());

        if check.mode == ComparisonMode::Latest {
            out.sql.push_str(&format!(
                "{} = (SELECT {} FROM {} AS et2 WHERE {} = {} AND {} = ? ORDER BY {} DESC, {} DESC LIMIT 1) AND ",
                self.col("et", "id"),
                self.col("et2", "id"),
                self.table(EVENTS),
                self.col("et2", "subscriber_id"),
                self.contact_col("id"),
                self.col("et2", "event_key"),
                self.col("et2", "created_at"),
                self.col("et2", "id"),
            ));
            out.params.push(check.event_key.as_str().into());
        }

        let path = json_path(&check.prop_name);
        match (&check.value, check.op) {
            (CompareValue::Number(expected), op) if op.is_numeric() => {
                let sql_op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Lt => "<",
                    _ => ">",
                };
                self.write_numeric_extract(&path, out);
                out.sql.push_str(&format!(" {} ?", sql_op));
                out.params.push((*expected).into());
            }
            (CompareValue::Text(needle), CompareOp::Contains | CompareOp::NotContains) => {
                let sql_op = if check.op == CompareOp::Contains {
                    "LIKE"
                } else {
                    "NOT LIKE"
                };
                self.write_text_extract(&path, out);
                out.sql.push_str(&format!(" {} ?", sql_op));
                if self.dialect == SqlDialect::Sqlite {
                    out.sql.push_str(" ESCAPE '\\'");
                }
                out.params.push(format!("%{}%", escape_like(needle)).into());
            }
            (value, op) => {
                return Err(RuntimeError::UnsupportedPredicate(format!(
                    "operator {} with value {:?}",
                    op, value
                )))
            }
        }

        out.sql.push(')');
        Ok(())
    }

    /// Property as a number; NULL when missing, null, an object or an array
    fn write_numeric_extract(&self, path: &str, out: &mut SqlFragment) {
        let v = self.col("et", "value");
        let sql = match self.dialect {
            SqlDialect::MySql => format!(
                "(CASE WHEN JSON_VALID({v}) THEN (CASE JSON_TYPE(JSON_EXTRACT({v}, ?)) \
                 WHEN 'BOOLEAN' THEN IF(JSON_UNQUOTE(JSON_EXTRACT({v}, ?)) = 'true', 1, 0) \
                 WHEN 'NULL' THEN NULL WHEN 'OBJECT' THEN NULL WHEN 'ARRAY' THEN NULL \
                 ELSE CAST(JSON_UNQUOTE(JSON_EXTRACT({v}, ?)) AS DECIMAL(65,10)) END) END)",
                v = v
            ),
            SqlDialect::Sqlite => format!(
                "(CASE WHEN json_valid({v}) THEN (CASE json_type({v}, ?) \
                 WHEN 'text' THEN CAST(json_extract({v}, ?) AS REAL) \
                 WHEN 'true' THEN 1 WHEN 'false' THEN 0 \
                 WHEN 'null' THEN NULL WHEN 'object' THEN NULL WHEN 'array' THEN NULL \
                 ELSE json_extract({v}, ?) END) END)",
                v = v
            ),
        };
        out.sql.push_str(&sql);
        for _ in 0..3 {
            out.params.push(path.into());
        }
    }

    /// Property as text; NULL when missing or null
    fn write_text_extract(&self, path: &str, out: &mut SqlFragment) {
        let v = self.col("et", "value");
        let sql = match self.dialect {
            SqlDialect::MySql => format!(
                "(CASE WHEN JSON_VALID({v}) THEN (CASE JSON_TYPE(JSON_EXTRACT({v}, ?)) \
                 WHEN 'NULL' THEN NULL ELSE JSON_UNQUOTE(JSON_EXTRACT({v}, ?)) END) END)",
                v = v
            ),
            SqlDialect::Sqlite => format!(
                "(CASE WHEN json_valid({v}) THEN (CASE json_type({v}, ?) \
                 WHEN 'null' THEN NULL WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' \
                 ELSE json_extract({v}, ?) END) END)",
                v = v
            ),
        };
        out.sql.push_str(&sql);
        for _ in 0..2 {
            out.params.push(path.into());
        }
    }
}

/// JSON path selecting one top-level member, with the name quoted
fn json_path(prop_name: &str) -> String {
    let escaped = prop_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("$.\"{}\"", escaped)
}

fn bind_value(value: &Value) -> Result<SqlParam> {
    match value {
        Value::Int(i) => Ok(SqlParam::Int(*i)),
        Value::Float(f) => Ok(SqlParam::Float(*f)),
        Value::Bool(b) => Ok(SqlParam::Int(i64::from(*b))),
        Value::String(s) => Ok(SqlParam::Text(s.clone())),
        other => Err(RuntimeError::InvalidValue(format!(
            "cannot bind {:?} in a record condition",
            other
        ))),
    }
}
