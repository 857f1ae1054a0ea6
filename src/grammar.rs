//! Grammar Synthesizer
//!
//! Compiles a [`Schema`] into a Lark grammar for the supported ClickHouse SQL
//! subset, plus a prose description of the same capabilities. The table and
//! column alternations are generated from the schema; every other production
//! is fixed.
//!
//! Output is a pure function of the schema: table and column names are
//! enumerated in sorted order so the same schema always produces byte-identical
//! grammar text.

use crate::error::{Nl2SqlError, Result};
use crate::schema::Schema;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    static ref NON_IDENTIFIER: Regex = Regex::new(r"[^A-Za-z0-9_]").unwrap();
}

/// Prefix for column terminals. Keeps them clear of SQL keywords and of the
/// fixed terminals below.
const COLUMN_TERMINAL_PREFIX: &str = "COL_";

const GRAMMAR_HEADER: &str = r#"// Auto-generated ClickHouse SQL grammar

SP: " "
COMMA: ","
SEMI: ";"
LPAREN: "("
RPAREN: ")"
GT: ">"
LT: "<"
GTE: ">="
LTE: "<="
EQ: "="
NEQ: "!="

start: select_stmt SEMI
select_stmt: "SELECT" SP select_list SP "FROM" SP table (SP where_clause)? (SP group_clause)? (SP order_clause)? (SP limit_clause)?
select_list: select_item (COMMA SP select_item)*
select_item: agg_expr | column | star
star: "*"
agg_expr: agg_func LPAREN agg_arg RPAREN (SP "AS" SP alias)?
agg_func: "SUM" | "COUNT" | "AVG" | "MIN" | "MAX"
agg_arg: column | star
alias: IDENTIFIER

"#;

const GRAMMAR_FOOTER: &str = r#"where_clause: "WHERE" SP condition (SP "AND" SP condition)*
condition: column SP compare_op SP value
compare_op: GTE | LTE | GT | LT | EQ | NEQ
value: STRING | NUMBER | DATETIME
group_clause: "GROUP" SP "BY" SP column (COMMA SP column)*
order_clause: "ORDER" SP "BY" SP sort_item (COMMA SP sort_item)*
sort_item: column (SP sort_dir)?
sort_dir: "ASC" | "DESC"
limit_clause: "LIMIT" SP NUMBER
IDENTIFIER: /[A-Za-z_][A-Za-z0-9_]*/
NUMBER: /[0-9]+(\.[0-9]+)?/
STRING: /'[^']*'/
DATETIME: /'[0-9]{4}-[0-9]{2}-[0-9]{2}( [0-9]{2}:[0-9]{2}:[0-9]{2})?'/
"#;

const SUPPORTED_OPERATIONS: &str = "\nSupported operations:
- SELECT with columns or aggregates (SUM, COUNT, AVG, MIN, MAX)
- WHERE with comparisons (=, !=, >, <, >=, <=)
- GROUP BY columns
- ORDER BY columns (ASC/DESC)
- LIMIT

YOU MUST generate syntactically valid SQL that conforms to the grammar.";

/// Grammar text and capability description derived from one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlGrammar {
    /// Lark grammar handed to the generation service as the hard constraint
    pub definition: String,
    /// Advisory description of tables, columns and supported operations
    pub description: String,
    /// Table names in the `table` production, sorted
    pub tables: Vec<String>,
    /// Column terminal identifier -> raw column name
    pub columns: BTreeMap<String, String>,
}

/// Map a raw column name to its grammar terminal identifier.
pub fn column_terminal(name: &str) -> String {
    format!(
        "{}{}",
        COLUMN_TERMINAL_PREFIX,
        NON_IDENTIFIER.replace_all(name, "_").to_uppercase()
    )
}

/// Quote a catalog name as a Lark string literal. Control characters are
/// escaped so a name can never break out of its line.
fn lark_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn synthesize(schema: &Schema) -> Result<SqlGrammar> {
    if schema.is_empty() {
        return Err(Nl2SqlError::EmptySchema("catalog returned no tables".to_string()));
    }

    let tables: Vec<String> = schema
        .tables
        .iter()
        .map(|t| t.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let column_names: BTreeSet<&str> = schema
        .tables
        .iter()
        .flat_map(|t| t.columns.iter().map(|c| c.name.as_str()))
        .collect();
    if column_names.is_empty() {
        return Err(Nl2SqlError::EmptySchema("no table has any columns".to_string()));
    }

    let mut columns: BTreeMap<String, String> = BTreeMap::new();
    for name in &column_names {
        let terminal = column_terminal(name);
        if let Some(existing) = columns.get(&terminal) {
            return Err(Nl2SqlError::GrammarCollision {
                terminal,
                first: existing.clone(),
                second: name.to_string(),
            });
        }
        columns.insert(terminal, name.to_string());
    }

    let mut definition = String::from(GRAMMAR_HEADER);

    definition.push_str("// Tables\n");
    definition.push_str(&format!(
        "table: {}\n\n",
        tables.iter().map(|t| lark_literal(t)).join(" | ")
    ));

    // Terminals are listed in raw-name order so the alternation below reads
    // in the same order as the capability description.
    definition.push_str("// Columns\n");
    let mut column_rules = Vec::with_capacity(column_names.len());
    for name in &column_names {
        let terminal = column_terminal(name);
        definition.push_str(&format!("{}: {}\n", terminal, lark_literal(name)));
        column_rules.push(terminal);
    }
    definition.push_str(&format!("column: {}\n\n", column_rules.join(" | ")));

    definition.push_str(GRAMMAR_FOOTER);

    Ok(SqlGrammar {
        definition,
        description: describe(schema),
        tables,
        columns,
    })
}

/// Capability description: every table with its columns and declared types.
pub fn describe(schema: &Schema) -> String {
    let mut out = String::from("Generates valid ClickHouse SQL queries.\n\n");
    out.push_str("Available tables and columns:\n");

    for table in schema.tables.iter().sorted_by(|a, b| a.name.cmp(&b.name)) {
        out.push_str(&format!("\n## {}\n", table.name));
        for column in table.columns.iter().sorted_by(|a, b| a.name.cmp(&b.name)) {
            out.push_str(&format!("- {} ({})\n", column.name, column.column_type));
        }
    }

    out.push_str(SUPPORTED_OPERATIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn order_items() -> Table {
        Table::new(
            "order_items",
            vec![
                Column::new("order_id", "String"),
                Column::new("order_item_id", "Int32"),
                Column::new("product_id", "String"),
                Column::new("seller_id", "String"),
                Column::new("shipping_limit_date", "DateTime"),
                Column::new("price", "Float64"),
                Column::new("freight_value", "Float64"),
            ],
        )
    }

    fn production<'a>(grammar: &'a str, rule: &str) -> &'a str {
        let prefix = format!("{}: ", rule);
        grammar
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .unwrap_or_else(|| panic!("no production for {}", rule))
    }

    #[test]
    fn test_column_terminal() {
        assert_eq!(column_terminal("price"), "COL_PRICE");
        assert_eq!(column_terminal("shipping-limit date"), "COL_SHIPPING_LIMIT_DATE");
        assert_eq!(column_terminal("select"), "COL_SELECT");
    }

    #[test]
    fn test_table_and_column_productions_match_schema() {
        let schema = Schema::new(vec![
            order_items(),
            Table::new(
                "sellers",
                vec![Column::new("seller_id", "String"), Column::new("seller_city", "String")],
            ),
        ]);
        let grammar = synthesize(&schema).unwrap();

        assert_eq!(
            production(&grammar.definition, "table"),
            r#""order_items" | "sellers""#
        );

        let column_rule: Vec<&str> = production(&grammar.definition, "column").split(" | ").collect();
        assert_eq!(
            column_rule,
            vec![
                "COL_FREIGHT_VALUE",
                "COL_ORDER_ID",
                "COL_ORDER_ITEM_ID",
                "COL_PRICE",
                "COL_PRODUCT_ID",
                "COL_SELLER_CITY",
                "COL_SELLER_ID",
                "COL_SHIPPING_LIMIT_DATE",
            ]
        );

        // seller_id appears in both tables but only once in the grammar
        assert_eq!(grammar.definition.matches("COL_SELLER_ID: ").count(), 1);
        for (terminal, raw) in &grammar.columns {
            assert_eq!(
                production(&grammar.definition, terminal),
                format!("\"{}\"", raw)
            );
        }
        assert_eq!(grammar.tables, vec!["order_items", "sellers"]);
        assert_eq!(grammar.columns.len(), 8);
    }

    #[test]
    fn test_fixed_productions_present() {
        let grammar = synthesize(&Schema::new(vec![order_items()])).unwrap();
        let def = &grammar.definition;

        assert_eq!(production(def, "start"), "select_stmt SEMI");
        assert_eq!(
            production(def, "agg_func"),
            r#""SUM" | "COUNT" | "AVG" | "MIN" | "MAX""#
        );
        assert_eq!(production(def, "compare_op"), "GTE | LTE | GT | LT | EQ | NEQ");
        assert_eq!(production(def, "value"), "STRING | NUMBER | DATETIME");
        assert_eq!(production(def, "sort_dir"), r#""ASC" | "DESC""#);
        assert!(def.contains(r#"limit_clause: "LIMIT" SP NUMBER"#));
        assert!(def.contains(r#"group_clause: "GROUP" SP "BY""#));
    }

    #[test]
    fn test_deterministic_regardless_of_catalog_order() {
        let a = Schema::new(vec![
            order_items(),
            Table::new("sellers", vec![Column::new("seller_city", "String")]),
        ]);
        let mut reversed = a.clone();
        reversed.tables.reverse();
        reversed.tables[1].columns.reverse();

        let first = synthesize(&a).unwrap();
        let second = synthesize(&a).unwrap();
        assert_eq!(first.definition, second.definition);
        assert_eq!(first.definition, synthesize(&reversed).unwrap().definition);
        assert_eq!(first.description, synthesize(&reversed).unwrap().description);
    }

    #[test]
    fn test_collision_is_an_error() {
        let schema = Schema::new(vec![Table::new(
            "events",
            vec![Column::new("user-id", "String"), Column::new("user_id", "String")],
        )]);

        match synthesize(&schema) {
            Err(Nl2SqlError::GrammarCollision { terminal, first, second }) => {
                assert_eq!(terminal, "COL_USER_ID");
                assert_eq!(first, "user-id");
                assert_eq!(second, "user_id");
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn test_case_only_difference_collides() {
        let schema = Schema::new(vec![
            Table::new("a", vec![Column::new("Price", "Float64")]),
            Table::new("b", vec![Column::new("price", "Float64")]),
        ]);
        assert!(matches!(
            synthesize(&schema),
            Err(Nl2SqlError::GrammarCollision { .. })
        ));
    }

    #[test]
    fn test_empty_schema_rejected() {
        assert!(matches!(
            synthesize(&Schema::default()),
            Err(Nl2SqlError::EmptySchema(_))
        ));
        assert!(matches!(
            synthesize(&Schema::new(vec![Table::new("empty", vec![])])),
            Err(Nl2SqlError::EmptySchema(_))
        ));
    }

    #[test]
    fn test_literals_escaped() {
        let schema = Schema::new(vec![Table::new(
            "odd",
            vec![Column::new(r#"say "hi""#, "String")],
        )]);
        let grammar = synthesize(&schema).unwrap();
        assert!(grammar
            .definition
            .contains(r#"COL_SAY__HI_: "say \"hi\"""#));
    }

    #[test]
    fn test_control_characters_escaped() {
        let schema = Schema::new(vec![Table::new(
            "odd\ntable",
            vec![Column::new("a\tb\rc\u{7}", "String")],
        )]);
        let grammar = synthesize(&schema).unwrap();

        let lines: Vec<&str> = grammar.definition.lines().collect();
        assert!(lines.contains(&r#"table: "odd\ntable""#));
        assert!(lines.contains(&r#"COL_A_B_C_: "a\tb\rc\x07""#));
        assert!(!grammar.definition.contains('\t'));
        assert!(!grammar.definition.contains('\r'));
    }

    #[test]
    fn test_description_lists_columns_with_types() {
        let grammar = synthesize(&Schema::new(vec![order_items()])).unwrap();
        let desc = &grammar.description;

        assert!(desc.contains("## order_items\n"));
        assert!(desc.contains("- price (Float64)\n"));
        assert!(desc.contains("- shipping_limit_date (DateTime)\n"));
        assert!(desc.contains("GROUP BY columns"));
        let freight = desc.find("- freight_value").unwrap();
        let price = desc.find("- price").unwrap();
        assert!(freight < price);
    }
}
