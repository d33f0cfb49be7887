//! Documentation and report templates
//!
//! Static bundle documents rendered with Handlebars. The LLM writes the
//! enhanced standard itself; these templates produce the supporting
//! checklists and human-readable reports around it.

use handlebars::Handlebars;
use serde_json::json;

use super::{DeploymentOutcome, FeedbackOutcome, ValidationOutcome, WorkflowContext};

const IMPLEMENTATION_CHECKLIST: &str = r#"# Implementation Checklist: {{title}}

## Pre-Implementation
- [ ] Review team capacity and timeline
- [ ] Identify key stakeholders
- [ ] Plan rollout strategy

## Implementation
- [ ] Set up tooling and automation
- [ ] Train team members
- [ ] Update documentation
- [ ] Apply to new code

## Post-Implementation
- [ ] Monitor compliance
- [ ] Gather feedback
- [ ] Refine as needed
"#;

const ONBOARDING_GUIDE: &str = r#"# Team Onboarding Guide: {{title}}

## For a {{team_size}} team with {{experience_level}} experience level

### Week 1: Introduction
- Introduction session (1 hour)
- Review examples and rationale
- Q&A session

### Week 2-3: Gradual Adoption
- Apply to new features only
- Pair programming sessions
- Regular check-ins

### Week 4+: Full Implementation
- Apply to all new code
- Refactor existing code gradually
- Regular compliance checks
"#;

const COMPLIANCE_CHECKLIST: &str = r#"# Compliance Checklist: {{title}}

## Code Review Checklist
- [ ] Naming conventions followed
- [ ] Structure guidelines met
- [ ] Documentation requirements satisfied
- [ ] Performance considerations addressed

## Automated Checks
- [ ] Linter rules configured
- [ ] Static analysis setup
- [ ] CI/CD integration active

## Manual Reviews
- [ ] Architecture alignment
- [ ] Business logic clarity
- [ ] Error handling completeness
"#;

const DEPLOYMENT_REPORT: &str = r#"# Deployment Report

## Summary
- Deployments attempted: {{attempted}}
- Successful: {{succeeded}}
- Failed: {{failed}}

## Details
{{#each sinks}}
- {{this.sink}}: {{#if this.success}}ok{{else}}failed{{/if}}{{#if this.detail}} ({{this.detail}}){{/if}}
{{/each}}
"#;

const COMPLETION_REPORT: &str = r#"# Workflow Completion Report

## Summary
{{summary}}

## Quality Assessment
- Validation score: {{validation_score}}/100 ({{quality_level}})
- Validation passed: {{validation_passed}}

## Next Steps
{{#each next_steps}}
1. {{this}}
{{/each}}

## Implementation Recommendations
{{#each recommendations}}
- {{this}}
{{/each}}

## Lessons Learned
{{#each lessons_learned}}
- {{this}}
{{/each}}
"#;

/// Renders workflow documents from embedded templates
pub struct Reports {
    hbs: Handlebars<'static>,
}

impl Default for Reports {
    fn default() -> Self {
        Self::new()
    }
}

impl Reports {
    pub fn new() -> Self {
        Self { hbs: Handlebars::new() }
    }

    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, String> {
        self.hbs.render_template(template, data).map_err(|e| e.to_string())
    }

    pub fn implementation_checklist(&self, title: &str) -> Result<String, String> {
        self.render(IMPLEMENTATION_CHECKLIST, &json!({ "title": title }))
    }

    pub fn onboarding_guide(&self, title: &str, context: &WorkflowContext) -> Result<String, String> {
        let team_size = context.project_context["team_size"].as_str().unwrap_or("unknown-size");
        let experience_level = context.project_context["experience_level"]
            .as_str()
            .unwrap_or("intermediate");
        self.render(
            ONBOARDING_GUIDE,
            &json!({ "title": title, "team_size": team_size, "experience_level": experience_level }),
        )
    }

    pub fn compliance_checklist(&self, title: &str) -> Result<String, String> {
        self.render(COMPLIANCE_CHECKLIST, &json!({ "title": title }))
    }

    pub fn deployment_report(&self, outcome: &DeploymentOutcome) -> Result<String, String> {
        let succeeded = outcome.sinks.iter().filter(|s| s.success).count();
        self.render(
            DEPLOYMENT_REPORT,
            &json!({
                "attempted": outcome.sinks.len(),
                "succeeded": succeeded,
                "failed": outcome.sinks.len() - succeeded,
                "sinks": outcome.sinks,
            }),
        )
    }

    pub fn completion_report(
        &self,
        feedback: &FeedbackOutcome,
        validation: Option<&ValidationOutcome>,
    ) -> Result<String, String> {
        self.render(
            COMPLETION_REPORT,
            &json!({
                "summary": feedback.summary,
                "validation_score": validation.map(|v| v.overall_score.round()).unwrap_or(0.0),
                "quality_level": validation.map(|v| v.quality_level.clone()).unwrap_or_else(|| "unknown".to_string()),
                "validation_passed": validation.map(|v| v.validation_passed).unwrap_or(false),
                "next_steps": feedback.next_steps,
                "recommendations": feedback.recommendations,
                "lessons_learned": feedback.lessons_learned,
            }),
        )
    }
}
