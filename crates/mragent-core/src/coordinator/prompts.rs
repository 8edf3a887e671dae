use serde::{Deserialize, Serialize};

use super::AgentKind;
use crate::llm::Message;

/// A recorded coordinator run shown to the model as an example of what not to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceRoute {
    pub conversation: Vec<Message>,
    /// Original ids the run verified.
    pub verified_documents: Vec<String>,
    pub gold_documents: Vec<String>,
}

struct AgentEntry {
    kind: AgentKind,
    summary: &'static str,
    inputs: &'static [(&'static str, &'static str)],
    outputs: &'static [(&'static str, &'static str)],
}

const INFORMATION: (&str, &str) = (
    "information",
    "what you have gathered so far, as a summary or highlights; may be empty",
);

const CATALOGUE: &[AgentEntry] = &[
    AgentEntry {
        kind: AgentKind::Validator,
        summary: "Checks whether a response meets the criteria of the question, is grounded in supporting information and is correct.",
        inputs: &[INFORMATION, ("response", "the response to check")],
        outputs: &[
            ("extracted_criteria", "criteria taken from the question, each with a verdict and feedback"),
            ("is_groundedly_supported", "whether every part of the response is supported"),
            ("is_correctly_answered", "whether the response is correct, with feedback"),
        ],
    },
    AgentEntry {
        kind: AgentKind::Summarizer,
        summary: "Summarizes the information gathered so far.",
        inputs: &[INFORMATION],
        outputs: &[("summary", "the summary")],
    },
    AgentEntry {
        kind: AgentKind::Planner,
        summary: "Plans a strategy for answering the question. Useful at the start and whenever the plan needs revisiting.",
        inputs: &[INFORMATION],
        outputs: &[("plan", "the plan")],
    },
    AgentEntry {
        kind: AgentKind::Reasoner,
        summary: "Reasons about one aspect of the question using the information gathered so far.",
        inputs: &[INFORMATION, ("aspect", "the aspect to reason about")],
        outputs: &[("analysis", "the reasoning")],
    },
    AgentEntry {
        kind: AgentKind::ComplexSearcher,
        summary: "Splits a multi-part question into sub-questions and searches for each of them.",
        inputs: &[INFORMATION],
        outputs: &[
            ("mode", "\"single\" when the question was searched directly, \"multi\" when it was split"),
            ("num_new_documents", "documents verified by this call (multi mode)"),
            ("total_documents", "documents verified so far in this run (multi mode)"),
        ],
    },
    AgentEntry {
        kind: AgentKind::Searcher,
        summary: "Searches for documents that help answer the question and keeps the relevant ones.",
        inputs: &[INFORMATION, ("suggestions", "what aspects to search for")],
        outputs: &[
            ("found_information", "whether any relevant document has been found"),
            ("documents", "texts of every relevant document found so far"),
        ],
    },
    AgentEntry {
        kind: AgentKind::Answerer,
        summary: "Writes a response to the question from the relevant documents found so far.",
        inputs: &[
            ("guidance", "how the response should be structured and what it should cover; not the answer itself"),
            ("important_information", "the most important information the response must include"),
        ],
        outputs: &[("response", "the response")],
    },
    AgentEntry {
        kind: AgentKind::Reviser,
        summary: "Revises the latest response. Only usable after the answerer.",
        inputs: &[("suggestion", "the revisions to make")],
        outputs: &[("response", "the revised response")],
    },
    AgentEntry {
        kind: AgentKind::Finisher,
        summary: "Ends the task. The latest answerer or reviser response becomes the final answer.",
        inputs: &[("finished", "true")],
        outputs: &[],
    },
];

/// System prompt that seeds a coordinator conversation.
pub fn system_prompt(question: &str, concise: bool, experience: Option<&ExperienceRoute>) -> String {
    let goal = if concise {
        "a concise, informative response that is relevant to the question"
    } else {
        "an informative response that is relevant to the question"
    };
    let mut prompt = format!(
        "You coordinate a team of agents to produce {goal}. The task takes several turns. \
In every turn pick the single most suitable agent from the list below; agents may be used \
repeatedly and in any order.\n\n\
Reply with a JSON object in a ```json``` block with the fields:\n\
- \"agent\": the agent name\n\
- \"input\": a JSON object with the agent's input fields\n\
- \"reason\": why this agent is the right next step\n\n\
The agent's output comes back in the next message.\n\n# Agents\n"
    );
    for entry in CATALOGUE {
        prompt.push_str(&format!("\n## {}\n{}\ninput:\n", entry.kind, entry.summary));
        for (name, description) in entry.inputs {
            prompt.push_str(&format!("  - \"{name}\": {description}\n"));
        }
        if entry.outputs.is_empty() {
            prompt.push_str("output: none\n");
        } else {
            prompt.push_str("output:\n");
            for (name, description) in entry.outputs {
                prompt.push_str(&format!("  - \"{name}\": {description}\n"));
            }
        }
    }
    prompt.push_str(&format!("\n# Question\n{question}\n"));

    if let Some(route) = experience {
        let example = serde_json::to_string(route).unwrap_or_default();
        prompt.push_str(&format!(
            "\n# Negative example\nThe run below failed to find the gold documents. Its \
\"verified_documents\" are the documents it settled on and \"gold_documents\" are the ones it \
should have found. Work out why its strategy failed before choosing your first agent.\n{example}\n"
        ));
    }
    prompt
}

/// The seeded conversation for a new run.
pub fn initial_conversation(
    question: &str,
    concise: bool,
    experience: Option<&ExperienceRoute>,
) -> Vec<Message> {
    vec![Message::system(system_prompt(question, concise, experience))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_lists_every_agent() {
        let prompt = system_prompt("Who wrote Dune?", true, None);
        for kind in AgentKind::ALL {
            assert!(prompt.contains(&format!("## {kind}")), "missing {kind}");
        }
        assert!(prompt.contains("concise"));
        assert!(prompt.ends_with("Who wrote Dune?\n"));
    }

    #[test]
    fn non_concise_prompt_drops_concision() {
        assert!(!system_prompt("q", false, None).contains("concise"));
    }

    #[test]
    fn experience_is_appended_as_negative_example() {
        let route = ExperienceRoute {
            conversation: vec![Message::assistant("{\"agent\": \"finisher\"}")],
            verified_documents: vec!["doc-9".into()],
            gold_documents: vec!["doc-2".into()],
        };
        let prompt = system_prompt("q", true, Some(&route));
        assert!(prompt.contains("# Negative example"));
        assert!(prompt.contains("doc-9"));
        assert!(prompt.contains("doc-2"));
    }
}
