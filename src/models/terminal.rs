// Terminal: a labelled sink of a workflow graph. Carries no payload of its
// own beyond identity — the Workflow Interpreter returns the terminal's id
// as the execution result when it is reached.

use serde::{Deserialize, Serialize};

use super::ids::{NamespaceId, TerminalId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalDef {
    pub namespace: NamespaceId,
    pub id: TerminalId,
}

impl TerminalDef {
    pub fn new(namespace: NamespaceId, id: TerminalId) -> Self {
        TerminalDef { namespace, id }
    }
}
