//! Built-in prompt templates
//!
//! Compiled into the binary; a deployment can register replacements or load
//! additional sets from JSON files.

pub struct BuiltinTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub template: &'static str,
    pub variables: &'static [&'static str],
    pub system_prompt: &'static str,
}

pub const BUILTINS: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        id: "code_analysis",
        name: "Code Analysis",
        template: r#"Analyze the following {language} code and report on:
- Code quality
- Potential defects
- Best-practice violations
- Suggested improvements

Code:
```{language}
{code}
```

Respond with JSON:
{"recommendations": [{"description": "...", "category": "...", "priority": "critical|high|medium|low", "suggestion": "...", "line": null}], "summary": "..."}"#,
        variables: &["language", "code"],
        system_prompt: "You are an expert code reviewer with deep knowledge of software engineering best practices.",
    },
    BuiltinTemplate {
        id: "standards_research",
        name: "Standards Research",
        template: r#"Research and write a comprehensive coding standard for:

Topic: {topic}
Language: {language}
Focus areas: {focus_areas}

The standard must include:
1. Overview and rationale
2. Key principles
3. Code examples, both good and bad
4. Common pitfalls to avoid
5. Testing requirements
6. References

Write a detailed, professional coding standard in markdown."#,
        variables: &["topic", "language", "focus_areas"],
        system_prompt: "You are a software architecture expert creating professional coding standards.",
    },
    BuiltinTemplate {
        id: "code_generation",
        name: "Code Generation",
        template: r#"Generate {language} code implementing the following.

Requirements:
{requirements}

Constraints:
{constraints}

The code must follow best practices, be well documented, include error
handling, and be production-ready."#,
        variables: &["language", "requirements", "constraints"],
        system_prompt: "You are an expert software engineer writing production-quality code.",
    },
    BuiltinTemplate {
        id: "bug_fix",
        name: "Bug Fix",
        template: r#"Analyze and fix the following bug.

Description: {bug_description}

Code:
```{language}
{code}
```

Error/symptoms:
{error}

1. Identify the root cause
2. Provide a fix
3. Explain why the bug occurred
4. Suggest how to prevent similar defects"#,
        variables: &["bug_description", "language", "code", "error"],
        system_prompt: "You are an expert debugger skilled at finding and fixing software defects.",
    },
    BuiltinTemplate {
        id: "code_review",
        name: "Code Review",
        template: r#"Review the following {language} code changes.

Context: {context}

Changes:
```{language}
{changes}
```

Review for correctness, performance, security, maintainability, and style
consistency. Give specific, actionable feedback."#,
        variables: &["language", "context", "changes"],
        system_prompt: "You are a senior engineer conducting a thorough code review.",
    },
    BuiltinTemplate {
        id: "refactoring",
        name: "Code Refactoring",
        template: r#"Refactor the following {language} code.

Focus: {focus}

Current code:
```{language}
{code}
```

Issues to address:
{issues}

Provide the refactored code, an explanation of the changes, and the
benefits of the refactoring."#,
        variables: &["language", "focus", "code", "issues"],
        system_prompt: "You are a refactoring expert skilled at improving code quality.",
    },
    BuiltinTemplate {
        id: "documentation",
        name: "Documentation Generation",
        template: r#"Generate documentation for the following code.

Code:
```{language}
{code}
```

Documentation type: {doc_type}

Include purpose and overview, parameters and return values, usage
examples, edge cases and limitations, and related functions."#,
        variables: &["language", "code", "doc_type"],
        system_prompt: "You are a technical writer creating clear, comprehensive documentation.",
    },
    BuiltinTemplate {
        id: "test_generation",
        name: "Test Generation",
        template: r#"Generate tests for the following code.

Code:
```{language}
{code}
```

Test framework: {test_framework}
Coverage requirements: {coverage}

Cover normal cases, edge cases, error conditions, and integration
scenarios."#,
        variables: &["language", "code", "test_framework", "coverage"],
        system_prompt: "You are a testing expert writing thorough, maintainable tests.",
    },
];
