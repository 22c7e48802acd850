//! Vapor IR
//!
//! The structure handed to the code generator: a deduplicated template table
//! plus one block per structural scope, each holding ordered operations and
//! reactive effects.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionLoc {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SimpleExpression {
    pub content: String,
    pub is_static: bool,
    #[serde(default)]
    pub loc: Option<ExpressionLoc>,
}

impl SimpleExpression {
    pub fn new_static(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_static: true,
            loc: None,
        }
    }

    pub fn new_dynamic(content: impl Into<String>, loc: Option<ExpressionLoc>) -> Self {
        Self {
            content: content.into(),
            is_static: false,
            loc,
        }
    }

    pub fn with_loc(mut self, loc: Option<ExpressionLoc>) -> Self {
        self.loc = loc;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DYNAMIC INFO
// ═══════════════════════════════════════════════════════════════════════════════

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DynamicFlag: u32 {
        /// The node needs a runtime handle.
        const REFERENCED = 1;
        /// The node is left out of the static template string.
        const NON_TEMPLATE = 1 << 1;
        /// The node is inserted at an anchor instead of appended.
        const INSERT = 1 << 2;
    }
}

mod flag_bits {
    use super::DynamicFlag;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flags: &DynamicFlag, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DynamicFlag, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(DynamicFlag::from_bits_truncate(bits))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IRDynamicInfo {
    #[serde(with = "flag_bits")]
    pub flags: DynamicFlag,
    pub has_dynamic_child: bool,
    pub id: Option<u32>,
    pub template: Option<usize>,
    pub anchor: Option<u32>,
    pub children: Vec<IRDynamicInfo>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKS & ROOT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpan {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IREffect {
    pub expressions: Vec<SimpleExpression>,
    pub operations: Vec<OperationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlockIRNode {
    pub node: NodeSpan,
    pub dynamic: IRDynamicInfo,
    pub effect: Vec<IREffect>,
    pub operation: Vec<OperationNode>,
    pub returns: Vec<u32>,
}

impl BlockIRNode {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            node: NodeSpan { start, end },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RootIRNode {
    pub source: String,
    pub template: Vec<String>,
    pub component: BTreeSet<String>,
    pub directive: BTreeSet<String>,
    pub block: BlockIRNode,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS, EVENTS, SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventModifiers {
    pub keys: Vec<String>,
    pub non_keys: Vec<String>,
    pub options: Vec<String>,
}

impl EventModifiers {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.non_keys.is_empty() && self.options.is_empty()
    }
}

/// What a directive transform contributes to an element's props.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveTransformResult {
    pub key: SimpleExpression,
    pub value: SimpleExpression,
    pub modifier: Option<String>,
    pub runtime_camelize: bool,
    pub handler: bool,
    pub handler_modifiers: Option<EventModifiers>,
    pub model: bool,
    pub model_modifiers: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IRProp {
    pub key: SimpleExpression,
    pub values: Vec<SimpleExpression>,
    pub modifier: Option<String>,
    pub runtime_camelize: bool,
    pub handler: bool,
    pub handler_modifiers: Option<EventModifiers>,
    pub model: bool,
    pub model_modifiers: Option<Vec<String>>,
}

impl From<DirectiveTransformResult> for IRProp {
    fn from(result: DirectiveTransformResult) -> Self {
        IRProp {
            key: result.key,
            values: vec![result.value],
            modifier: result.modifier,
            runtime_camelize: result.runtime_camelize,
            handler: result.handler,
            handler_modifiers: result.handler_modifiers,
            model: result.model,
            model_modifiers: result.model_modifiers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IRPropsDynamicExpression {
    pub value: SimpleExpression,
    pub handler: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IRPropsEntry {
    Static(Vec<IRProp>),
    Dynamic(IRPropsDynamicExpression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InheritProps {
    All(bool),
    Keys(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    Text,
    Checkbox,
    Radio,
    Select,
    File,
    Dynamic,
    Property,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedSlot {
    pub name: String,
    pub block: BlockIRNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "slotType", rename_all = "kebab-case")]
pub enum IRSlot {
    Static {
        slots: Vec<NamedSlot>,
    },
    Dynamic {
        name: SimpleExpression,
        #[serde(rename = "fn")]
        block: BlockIRNode,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveIR {
    pub name: String,
    pub exp: Option<SimpleExpression>,
    pub modifiers: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfIRNode {
    /// `None` for an `else if` branch folded into its parent's `negative`.
    pub id: Option<u32>,
    pub condition: SimpleExpression,
    pub positive: BlockIRNode,
    pub negative: Option<IfNegative>,
    pub once: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IfNegative {
    Block(BlockIRNode),
    If(Box<IfIRNode>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForIRNode {
    pub id: u32,
    pub source: SimpleExpression,
    pub value: Option<SimpleExpression>,
    pub key: Option<SimpleExpression>,
    pub index: Option<SimpleExpression>,
    pub key_prop: Option<SimpleExpression>,
    pub render: BlockIRNode,
    pub once: bool,
    pub component: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OperationNode {
    SetProp {
        element: u32,
        prop: IRProp,
        root: bool,
        tag: String,
    },
    SetDynamicProps {
        element: u32,
        props: Vec<IRPropsEntry>,
        root: bool,
    },
    SetText {
        element: u32,
        values: Vec<SimpleExpression>,
    },
    #[serde(rename_all = "camelCase")]
    SetEvent {
        element: u32,
        key: SimpleExpression,
        value: Option<SimpleExpression>,
        modifiers: EventModifiers,
        delegate: bool,
        effect: bool,
    },
    SetDynamicEvents {
        element: u32,
        event: SimpleExpression,
    },
    SetHtml {
        element: u32,
        value: SimpleExpression,
    },
    #[serde(rename_all = "camelCase")]
    SetTemplateRef {
        element: u32,
        value: SimpleExpression,
        ref_for: bool,
        effect: bool,
    },
    #[serde(rename_all = "camelCase")]
    SetModelValue {
        element: u32,
        key: String,
        value: SimpleExpression,
        model_type: ModelType,
        modifiers: Vec<String>,
    },
    SetInheritAttrs {
        element: u32,
        props: InheritProps,
    },
    CreateTextNode {
        id: u32,
        values: Vec<SimpleExpression>,
        effect: bool,
    },
    InsertNode {
        elements: Vec<u32>,
        parent: u32,
        anchor: Option<u32>,
    },
    PrependNode {
        elements: Vec<u32>,
        parent: u32,
    },
    WithDirective {
        element: u32,
        dir: DirectiveIR,
        name: String,
        asset: bool,
    },
    If(IfIRNode),
    For(ForIRNode),
    CreateComponent {
        id: u32,
        tag: String,
        props: Vec<IRPropsEntry>,
        slots: Vec<IRSlot>,
        asset: bool,
        root: bool,
        once: bool,
        dynamic: Option<SimpleExpression>,
    },
    DeclareOldRef {
        id: u32,
    },
    SlotOutlet {
        id: u32,
        name: SimpleExpression,
        props: Vec<IRPropsEntry>,
        fallback: Option<BlockIRNode>,
    },
}

impl OperationNode {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationNode::SetProp { .. } => "set-prop",
            OperationNode::SetDynamicProps { .. } => "set-dynamic-props",
            OperationNode::SetText { .. } => "set-text",
            OperationNode::SetEvent { .. } => "set-event",
            OperationNode::SetDynamicEvents { .. } => "set-dynamic-events",
            OperationNode::SetHtml { .. } => "set-html",
            OperationNode::SetTemplateRef { .. } => "set-template-ref",
            OperationNode::SetModelValue { .. } => "set-model-value",
            OperationNode::SetInheritAttrs { .. } => "set-inherit-attrs",
            OperationNode::CreateTextNode { .. } => "create-text-node",
            OperationNode::InsertNode { .. } => "insert-node",
            OperationNode::PrependNode { .. } => "prepend-node",
            OperationNode::WithDirective { .. } => "with-directive",
            OperationNode::If(_) => "if",
            OperationNode::For(_) => "for",
            OperationNode::CreateComponent { .. } => "create-component",
            OperationNode::DeclareOldRef { .. } => "declare-old-ref",
            OperationNode::SlotOutlet { .. } => "slot-outlet",
        }
    }
}
