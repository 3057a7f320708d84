//! Quiz prompt template

/// Number of questions requested per quiz
pub const QUESTIONS_PER_QUIZ: usize = 5;

/// Embed caller content verbatim in the quiz instruction template
///
/// The layout asks the model for questions wrapped in `''`, four options
/// and the correct option each wrapped in `--`, which is what the front-end
/// parses. The content is inserted between fixed start and end markers.
pub fn build_quiz_prompt(content: &str) -> String {
    format!(
        "Generate {n} quiz questions. Structure exactly as:\n\
         ''<Question>''\n\
         --<option1>--\n\
         --<option2>--\n\
         --<option3>--\n\
         --<option4>--\n\
         --<correct option among 4>--\n\
         Make sure total questions are {n} no less no more\n\
         <====Question Starts==\n\
         {content}\n\
         ==Question Ends====>",
        n = QUESTIONS_PER_QUIZ,
        content = content,
    )
}
