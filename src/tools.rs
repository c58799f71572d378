//! Builtin Tool Definitions
//!
//! Function-call declarations for the capabilities compiled into the
//! agent. Discovered skills contribute their own definitions through the
//! registry; both sets are handed to the completion service together.

use serde_json::{json, Value};

/// Schema of one builtin tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub required: Vec<String>,
}

impl ToolSchema {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({}),
            required: Vec::new(),
        }
    }

    /// Add a string parameter.
    pub fn with_string(mut self, name: &str, description: &str, required: bool) -> Self {
        self.parameters[name] = json!({"type": "string", "description": description});
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a number parameter.
    pub fn with_number(mut self, name: &str, description: &str, required: bool) -> Self {
        self.parameters[name] = json!({"type": "number", "description": description});
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add an enum-constrained string parameter.
    pub fn with_enum(mut self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.parameters[name] =
            json!({"type": "string", "description": description, "enum": values});
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Completion-wire (function-calling) format.
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.parameters,
                    "required": self.required,
                }
            }
        })
    }
}

/// All builtin tool schemas.
pub fn builtin_tools() -> Vec<ToolSchema> {
    vec![
        ToolSchema::new(
            "get_wallet_balance",
            "Get the balance and portfolio of a TRON wallet address, with USD values.",
        )
        .with_string("address", "The TRON wallet address (starting with T) to check", true),
        ToolSchema::new(
            "check_address_security",
            "Check the security risk level of a TRON address. Use to detect fraud, scams or malicious activity.",
        )
        .with_string("address", "The TRON address to check", true),
        ToolSchema::new(
            "record_transfer",
            "Step 1 of the transfer workflow: record the transfer in the address book, look up the recipient alias and increment the transfer count.",
        )
        .with_string("to_address", "The recipient's TRON address to record", true),
        ToolSchema::new(
            "check_malicious",
            "Step 2 of the transfer workflow: check whether the address is flagged as malicious on the TronScan blacklist.",
        )
        .with_string("address", "The TRON address to check for malicious tags", true),
        ToolSchema::new(
            "calculate_energy",
            "Step 3 of the transfer workflow (TRC20 only): estimate the energy required and compare rental vs burn cost.",
        )
        .with_string("token", "Token symbol (USDT, TRX, ...)", true),
        ToolSchema::new(
            "build_transfer",
            "Step 4 of the transfer workflow: build the final unsigned transaction for a TRX or TRC20 transfer.",
        )
        .with_string("to_address", "The recipient's TRON address", true)
        .with_string("token", "The token symbol to transfer (e.g. 'TRX', 'USDT')", true)
        .with_number("amount", "The amount of tokens to transfer", true),
        ToolSchema::new(
            "transfer_tokens",
            "Full transfer workflow (address book, deny-list, risk scoring, energy, build). Prefer this over the individual steps.",
        )
        .with_string("to_address", "The recipient's TRON address", true)
        .with_string("token", "The token symbol to transfer; 'u' means USDT", true)
        .with_number("amount", "The amount of tokens to transfer", true)
        .with_string(
            "memo",
            "Optional memo for the transfer, also saved as the recipient's address-book alias",
            false,
        ),
        ToolSchema::new(
            "analyze_error",
            "Analyze a blockchain/transaction error. Use when a transfer fails to explain why and suggest fixes.",
        )
        .with_string("error_message", "The error message to analyze", true),
        ToolSchema::new(
            "list_contacts",
            "List saved address book contacts.",
        )
        .with_enum("sort_by", "Sort order", &["count", "recent", "alpha"], false),
        ToolSchema::new(
            "search_contacts",
            "Search the address book by alias or address.",
        )
        .with_string("query", "Search string (case-insensitive)", true),
        ToolSchema::new(
            "generate_skill",
            "Generate a NEW skill when the user asks for functionality not covered by existing tools (e.g. batch transfers, wallet summaries, DeFi analytics).",
        )
        .with_string("requirement", "The user's requirement description", true)
        .with_string("skill_name", "Suggested kebab-case name for the skill", false),
        ToolSchema::new(
            "manage_skill",
            "Manage generated skills: 'save' keeps one permanently, 'delete' discards it.",
        )
        .with_string("skill_name", "Name of the skill to manage", true)
        .with_enum("action", "Action to perform", &["save", "delete"], true),
    ]
}

/// Builtin definitions in completion-wire format.
pub fn builtin_tool_definitions() -> Vec<Value> {
    builtin_tools().iter().map(|t| t.to_wire()).collect()
}

/// Whether a tool name belongs to a builtin (as opposed to a discovered
/// skill).
pub fn is_builtin(name: &str) -> bool {
    builtin_tools().iter().any(|t| t.name == name)
}
