use crate::retrieval::Document;

pub const SYSTEM: &str = r#"You are the search agent of a question-answering team. You find documents in a search engine that help answer a question.

You work in two kinds of turns.

Query turn: you receive the question, information gathered so far, and optional suggestions. Reply with a JSON object:
{"search_query": "<a focused query for the search engine>", "search_query_explanation": "<why this query helps>"}

Judgement turn: you receive a query id and a batch of retrieved documents. Decide for every document whether it helps answer the question. Reply with a JSON object:
{"relevance": [{"doc_id": "<id>", "is_relevant": true, "explanation": "<short reason>"}], "change_search_query": false, "new_search_query": "", "end_search": false}

Set "change_search_query" to true with a better "new_search_query" when the current query keeps returning unhelpful documents. Set "end_search" to true once you have enough relevant documents.

Reply with the JSON object only, followed by <ENDJSON>."#;

pub fn query_turn(question: &str, information: &str, suggestions: &str) -> String {
    format!(
        "Query turn.\n\nQuestion: {question}\n\nInformation gathered so far: {}\n\nSuggestions: {}\n\nPropose the next search query.",
        or_none(information),
        or_none(suggestions),
    )
}

pub fn judgement_turn(query_id: &str, query: &str, documents: &[Document]) -> String {
    let mut body = format!("Judgement turn.\n\nQuery id: {query_id}\nQuery: {query}\n\nDocuments:\n");
    for document in documents {
        body.push_str(&format!(
            "- doc_id: {}\n  text: \"{}\"\n",
            document.id,
            document.text.replace('"', "'")
        ));
    }
    body.push_str("\nJudge every document.");
    body
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "none" } else { text }
}
