use std::path::Path;

pub const CHAT_PERSONA: &str = "You are Mender, an AI assistant that helps with \
system administration and programming tasks on Linux. You can diagnose and repair \
code in many languages, explain error messages, install system packages and \
dependencies, and decrypt or deobfuscate scripts. Be helpful, concise and technical. \
If the user asks you to execute something or fix a file, reply with the exact \
commands or code to use.";

pub(crate) fn build_advisor_prompt(
    error_text: &str,
    file_path: Option<&Path>,
    command: Option<&str>,
) -> String {
    let mut context = String::new();
    if let Some(path) = file_path {
        context.push_str(&format!("File: {}\n", path.display()));
    }
    if let Some(command) = command {
        context.push_str(&format!("Command: {command}\n"));
    }

    format!(
        "Analyze this error and provide a repair plan.\n\
{context}\
Error:\n{error_text}\n\n\
Respond with a single JSON object and nothing else:\n\
{{\n  \"root_cause\": \"short explanation of the root cause\",\n  \
\"immediate_fix\": \"exact terminal command or corrected code\",\n  \
\"dependencies\": [\"system packages to install\"],\n  \
\"prevention\": \"how to avoid this in future\",\n  \
\"confidence\": 0.0\n}}\n\
Use an empty list when no dependencies are needed. \
Confidence is a number between 0 and 1."
    )
}

pub(crate) fn build_file_repair_prompt(path: &Path, language: &str, source: &str) -> String {
    format!(
        "Repair this {language} file so it runs successfully.\n\
Fix syntax errors, missing imports, logic errors and broken dependencies.\n\
Return ONLY the complete corrected source for the full file, no markdown, no prose.\n\
Preserve behavior and structure as much as possible.\n\
File: {}\n\
SOURCE START\n{source}\n\
SOURCE END",
        path.display()
    )
}

pub(crate) fn build_decrypt_prompt(path: &Path, language: &str, source: &str) -> String {
    format!(
        "This {language} file is encrypted or obfuscated.\n\
Decode every layer (base64, marshal, exec/compile wrappers) and return ONLY the \
readable, runnable source for the full file, no markdown, no prose.\n\
File: {}\n\
SOURCE START\n{source}\n\
SOURCE END",
        path.display()
    )
}
