//! Inference command implementations: chat, embed, answer, generate, register

use crate::app::Gateway;
use crate::backend::ChatMessage;
use crate::cli::output::{format_answer, wrap_json};
use crate::cli::{AnswerArgs, ChatArgs, EmbedArgs, GenerateArgs, RegisterArgs};
use crate::dispatch::{AnswerRequest, ChatRequest, EmbeddingRequest};
use crate::generation::GenerationRequest;
use crate::resolver::ProviderRef;
use colored::Colorize;

/// Handle `relay chat`
pub async fn handle_chat(
    args: &ChatArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system.clone()));
    }
    messages.push(ChatMessage::user(args.message.clone()));

    let completion = gateway
        .dispatcher
        .chat_completion(ChatRequest {
            tenant_id: args.tenant,
            provider: args.target.provider_ref(),
            model: args
                .target
                .model_ref(&gateway.config.dispatch.auto_model_sentinel),
            messages,
            temperature: args.temperature,
            max_tokens: args.max_tokens,
        })
        .await?;

    if args.json {
        return Ok(serde_json::to_string_pretty(&completion)?);
    }
    Ok(format!(
        "{}\n\n{}",
        completion.content,
        format!(
            "model: {}  tokens: {}",
            completion.model.as_deref().unwrap_or("auto"),
            completion.usage.total_tokens
        )
        .dimmed()
    ))
}

/// Handle `relay embed`
pub async fn handle_embed(
    args: &EmbedArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let vector = gateway
        .dispatcher
        .generate_embedding(EmbeddingRequest {
            tenant_id: args.tenant,
            provider: args.target.provider_ref(),
            model: args.target.model.clone(),
            text: args.text.clone(),
        })
        .await?;

    if args.json {
        return Ok(wrap_json("embedding", &vector)?);
    }
    let preview: Vec<String> = vector.iter().take(4).map(|v| format!("{:.4}", v)).collect();
    Ok(format!(
        "{} dimensions: [{}, ...]",
        vector.len(),
        preview.join(", ")
    ))
}

/// Handle `relay answer`
pub async fn handle_answer(
    args: &AnswerArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let agent = gateway
        .agents
        .get(args.agent)
        .ok_or_else(|| format!("Agent {} is not configured", args.agent))?;

    let mut request = AnswerRequest::new(args.tenant, agent, args.question.clone());
    request.provider = args.target.provider_ref();
    request.model = args
        .target
        .model_ref(&gateway.config.dispatch.auto_model_sentinel);
    request.knowledge_base_id = args.knowledge_base;

    let result = gateway.dispatcher.generate_answer(request).await?;
    if args.json {
        return Ok(serde_json::to_string_pretty(&result)?);
    }
    Ok(format_answer(&result))
}

/// Handle `relay generate`
pub async fn handle_generate(
    args: &GenerateArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    if args.sections == 0 {
        return Err("--sections must be at least 1".into());
    }

    let content = gateway
        .generator
        .generate(GenerationRequest {
            tenant_id: args.tenant,
            provider: args.target.provider_ref(),
            model: args
                .target
                .model_ref(&gateway.config.dispatch.auto_model_sentinel),
            query: args.query.clone(),
            agent_id: args.agent,
            knowledge_base_id: args.knowledge_base,
            total_sections: args.sections,
            max_tokens_per_section: args.max_tokens,
            temperature: None,
        })
        .await?;
    Ok(content)
}

/// Handle `relay register`
pub async fn handle_register(
    args: &RegisterArgs,
    gateway: &Gateway,
) -> Result<String, Box<dyn std::error::Error>> {
    let provider = ProviderRef::from(args.provider.as_str());
    let response = gateway
        .dispatcher
        .register_provider(args.tenant, &provider)
        .await?;
    Ok(serde_json::to_string_pretty(&response)?)
}
