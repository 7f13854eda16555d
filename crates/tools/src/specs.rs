use std::sync::Arc;

use qguard_core::{ComplaintRecord, ReworkRiskScorer, WorkOrderRecord};
use qguard_knowledge::{KnowledgeCorpus, KnowledgeMatch, DEFAULT_MATCH_LIMIT};
use qguard_ml::UrgencyClassifier;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SchemaSide, Tool, ToolError};

pub const URGENCY_TOOL: &str = "assess_urgency";
pub const SCORE_REWORK_TOOL: &str = "score_rework_risk";
pub const KNOWLEDGE_LOOKUP_TOOL: &str = "knowledge_lookup";

fn parse_args<T: serde::de::DeserializeOwned>(tool: &'static str, input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|error| ToolError::Validation {
        tool: tool.to_string(),
        side: SchemaSide::Input,
        field: "<root>".to_string(),
        message: error.to_string(),
    })
}

fn to_output<T: Serialize>(tool: &'static str, value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|error| ToolError::Invocation {
        tool: tool.to_string(),
        message: error.to_string(),
    })
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).expect("schema serializes")
}

/// Classifies one open complaint into an urgency tier.
pub struct UrgencyTool {
    classifier: Arc<UrgencyClassifier>,
}

impl UrgencyTool {
    pub fn new(classifier: Arc<UrgencyClassifier>) -> Self {
        Self { classifier }
    }
}

impl Tool for UrgencyTool {
    fn name(&self) -> &'static str {
        URGENCY_TOOL
    }

    fn description(&self) -> &'static str {
        "Classify an open complaint narrative into an urgency tier with \
         confidence and the matched signal phrases."
    }

    fn input_schema(&self) -> Value {
        schema_value::<ComplaintRecord>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<qguard_core::UrgencyAssessment>()
    }

    fn call(&self, input: Value) -> Result<Value, ToolError> {
        let record: ComplaintRecord = parse_args(URGENCY_TOOL, input)?;
        let assessment = self.classifier.assess(&record);
        to_output(URGENCY_TOOL, &assessment)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScoreReworkArgs {
    pub work_order: WorkOrderRecord,
    /// Historical rework rate in [0, 1]; omit when the contractor has no
    /// history.
    pub contractor_rework_rate: Option<f64>,
}

/// Scores one closed work order for rework risk.
pub struct ScoreReworkTool {
    scorer: ReworkRiskScorer,
}

impl ScoreReworkTool {
    pub fn new(scorer: ReworkRiskScorer) -> Self {
        Self { scorer }
    }
}

impl Tool for ScoreReworkTool {
    fn name(&self) -> &'static str {
        SCORE_REWORK_TOOL
    }

    fn description(&self) -> &'static str {
        "Score a closed work order for rework risk from asset age, \
         resolution type and contractor history."
    }

    fn input_schema(&self) -> Value {
        schema_value::<ScoreReworkArgs>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<qguard_core::ReworkRiskAssessment>()
    }

    fn call(&self, input: Value) -> Result<Value, ToolError> {
        let args: ScoreReworkArgs = parse_args(SCORE_REWORK_TOOL, input)?;
        let assessment = self
            .scorer
            .score(&args.work_order, args.contractor_rework_rate);
        to_output(SCORE_REWORK_TOOL, &assessment)
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeLookupArgs {
    pub keywords: Vec<String>,
    /// Maximum matches to return; defaults to 3.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeLookupReply {
    pub corpus_version: String,
    pub matches: Vec<KnowledgeMatch>,
}

/// Looks up operating-procedure snippets for a set of topic keywords.
pub struct KnowledgeLookupTool {
    corpus: Arc<KnowledgeCorpus>,
}

impl KnowledgeLookupTool {
    pub fn new(corpus: Arc<KnowledgeCorpus>) -> Self {
        Self { corpus }
    }
}

impl Tool for KnowledgeLookupTool {
    fn name(&self) -> &'static str {
        KNOWLEDGE_LOOKUP_TOOL
    }

    fn description(&self) -> &'static str {
        "Return the operating-procedure snippets with the highest keyword \
         overlap for a topic."
    }

    fn input_schema(&self) -> Value {
        schema_value::<KnowledgeLookupArgs>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<KnowledgeLookupReply>()
    }

    fn call(&self, input: Value) -> Result<Value, ToolError> {
        let args: KnowledgeLookupArgs = parse_args(KNOWLEDGE_LOOKUP_TOOL, input)?;
        let matches = self
            .corpus
            .lookup(&args.keywords, args.limit.unwrap_or(DEFAULT_MATCH_LIMIT));
        to_output(
            KNOWLEDGE_LOOKUP_TOOL,
            &KnowledgeLookupReply {
                corpus_version: self.corpus.version().to_string(),
                matches,
            },
        )
    }
}
