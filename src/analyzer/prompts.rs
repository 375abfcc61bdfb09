//! Prompt templates for the single-shot and relevance analyzers.

/// Answer format shared by both personas. The parser depends on it.
const FOUR_STEP_FORMAT: &str = "Step 1: [...]\n\
Step 2: [Yes/No] - [...]\n\
Step 3: [...]\n\
Step 4: Score = [score or 'Unclear'] - [...]\n\n";

/// Prompt for a neutral geopolitical analyst.
pub fn expert_prompt(country: &str, article_text: &str) -> String {
    format!(
        "[INST] You are a neutral media analyst specialized in {country}'s geopolitics.\n\
Read the following article and answer the four questions below, step by step.\n\
Base your analysis on the facts reported, how {country} is portrayed, and the implications for {country}'s image, not just the tone.\n\
If the article does not allow you to form a clear judgment of {country}'s image, you may answer 'Unclear' and skip scoring.\n\n\
Step 1 - Summarize:\n\
Summarize the article in 2-3 sentences.\n\n\
Step 2 - Relevance:\n\
Is the article relevant to {country}'s politics, society, international image, or government actions? (Yes / No). Justify briefly.\n\n\
Step 3 - Projected Image:\n\
What kind of image of {country} does the article convey? Be honest; if you can't say, explain why.\n\n\
Step 4 - Sentiment Score:\n\
Assign a score from -2 to +2 only if appropriate:\n\
-2 = strongly negative image\n\
-1 = somewhat negative\n \
0 = neutral or unclear\n\
+1 = somewhat positive\n\
+2 = strongly positive image\n\
If no clear image is conveyed, write: Score = Unclear - [Justification]\n\n\
Please format your response like this:\n\
{format}\
Article:\n{article_text}\n\n\
Your response: [/INST]",
        country = country,
        format = FOUR_STEP_FORMAT,
        article_text = article_text,
    )
}

/// Prompt for an open-minded layperson with no prior opinion.
pub fn naive_prompt(country: &str, article_text: &str) -> String {
    format!(
        "[INST] Imagine you are a thoughtful, open-minded person with no strong opinion about {country}.\n\
After reading the following article, reflect honestly on the image of {country} it gives you.\n\
If the article doesn't clearly influence your perception (too vague, technical, or off-topic),\n\
it's okay to say that you don't know or can't form an opinion. In that case, don't assign a score.\n\n\
Step 1: Summarize the article in 2-3 sentences.\n\
Step 2: Is the article related to {country}? (Yes / No). Explain.\n\
Step 3: What impression of {country} does the article give you? If none, explain why.\n\
Step 4: If the article clearly shapes your impression, give a score from -2 to +2:\n\
-2 = very negative impression\n\
-1 = somewhat negative\n \
0 = mixed or unclear\n\
+1 = somewhat positive\n\
+2 = very positive\n\
If you cannot form an opinion, write: Score = Unclear - [explain why]\n\n\
Format your answer like this:\n\
{format}\
Article:\n{article_text}\n\n\
Your response: [/INST]",
        country = country,
        format = FOUR_STEP_FORMAT,
        article_text = article_text,
    )
}

/// Prompt asking only whether the article bears on the country's image.
///
/// The verdict is expected on the last line.
pub fn relevance_prompt(country: &str, article_text: &str) -> String {
    format!(
        "[INST] You are a relevance classification assistant. Your task is to decide if an article affects \
the reader's perception of {country}: politically, socially, or symbolically.\n\n\
An article is RELEVANT if any of the following applies:\n\
1. {country} is one of the main subjects of the article.\n\
2. The article focuses on {country}'s political or institutional figures in a meaningful way.\n\
3. {country} is directly involved (host, participant, target, etc.).\n\
4. It discusses {country}'s foreign or domestic policy or international image.\n\
5. It reflects on how {country} or its institutions are perceived.\n\n\
An article is IRRELEVANT if:\n\
1. {country} is briefly mentioned or appears in a list.\n\
2. The name refers to something else entirely.\n\
3. The topic is unrelated sports, celebrity gossip, or market data.\n\
4. It covers another country's affairs without mentioning {country}.\n\n\
Instructions:\n\
Step 1: Summarize the article in 2-3 sentences.\n\
Step 2: Is {country} a main subject? Explain.\n\
Step 3: Any exclusion criteria matched? Justify.\n\
Step 4: relevancy: [yes/no/missing information] [END]\n\n\
Now analyze the following article:\n\
Article:\n{article_text}\n\n\
Your response:\n[/INST]",
        country = country,
        article_text = article_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_prompts_embed_article_and_format() {
        for prompt in [
            expert_prompt("India", "ARTICLE BODY"),
            naive_prompt("India", "ARTICLE BODY"),
        ] {
            assert!(prompt.contains("Article:\nARTICLE BODY\n\n"));
            assert!(prompt.contains("Step 4: Score = [score or 'Unclear']"));
            assert!(prompt.ends_with("[/INST]"));
        }
    }

    #[test]
    fn test_personas_differ_in_framing() {
        let expert = expert_prompt("Brazil", "x");
        let naive = naive_prompt("Brazil", "x");
        assert!(expert.contains("neutral media analyst"));
        assert!(naive.contains("open-minded person"));
        assert!(expert.contains("Brazil"));
        assert!(naive.contains("Brazil"));
    }

    #[test]
    fn test_relevance_prompt_asks_for_last_line_verdict() {
        let prompt = relevance_prompt("Kenya", "x");
        assert!(prompt.contains("relevancy: [yes/no/missing information]"));
        assert!(prompt.contains("perception of Kenya"));
    }
}
