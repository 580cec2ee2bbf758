// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::RequestMeta;
use crate::{
    auth::Auth,
    error::ApiError,
    identity::{did::parse_address, wallet::WALLET_ADDRESS_FIELD},
    rewards::{RewardError, SignedClaim},
    state::AppState,
    storage::{AuditEvent, AuditOutcome, IdentityRepository},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClaimRequest {
    pub activity_type: String,
    /// Identifier of the activity being rewarded (post id, referral id).
    pub proof_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub claim_id: String,
    /// Token amount in base units, as a decimal string.
    pub amount: String,
    pub reputation_points: u64,
    pub wallet_address: String,
    pub chain_id: u64,
    pub contract_address: String,
    pub signature: String,
    pub signer: String,
}

impl From<SignedClaim> for ClaimResponse {
    fn from(claim: SignedClaim) -> Self {
        Self {
            claim_id: claim.claim_id.to_string(),
            amount: claim.amount.to_string(),
            reputation_points: claim.reputation_points,
            wallet_address: claim.wallet_address,
            chain_id: claim.chain_id,
            contract_address: claim.contract_address.to_string(),
            signature: claim.signature,
            signer: claim.signer.to_string(),
        }
    }
}

fn sign_claim(
    state: &AppState,
    subject_id: &str,
    request: &ClaimRequest,
) -> Result<SignedClaim, ApiError> {
    let oracle = state.oracle.as_ref().ok_or(RewardError::NotConfigured)?;

    let identity = IdentityRepository::new(&state.db)
        .get(subject_id)?
        .ok_or(RewardError::WalletNotLinked)?;
    let address = state
        .cipher
        .decrypt(WALLET_ADDRESS_FIELD, &identity.wallet_address)
        .map_err(ApiError::internal)?;
    let wallet = parse_address(&address).map_err(ApiError::internal)?;

    Ok(oracle.claim(
        &state.db,
        subject_id,
        &wallet,
        &request.activity_type,
        &request.proof_id,
    )?)
}

#[utoipa::path(
    post,
    path = "/v1/rewards/claims",
    request_body = ClaimRequest,
    tag = "Rewards",
    responses(
        (status = 200, body = ClaimResponse),
        (status = 400, description = "Unknown activity type or invalid proof id"),
        (status = 403, description = "No wallet linked"),
        (status = 409, description = "Proof already claimed"),
        (status = 503, description = "Oracle not configured")
    )
)]
pub async fn create_claim(
    Auth(user): Auth,
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let result = sign_claim(&state, &user.subject_id, &request);

    let event = match &result {
        Ok(claim) => AuditEvent::new("reward", "claim", AuditOutcome::Success)
            .with_target(claim.claim_id.to_string())
            .with_status(200),
        Err(err) => AuditEvent::new(
            "reward",
            "claim",
            if err.status.is_server_error() {
                AuditOutcome::Error
            } else {
                AuditOutcome::Deny
            },
        )
        .with_status(err.status.as_u16()),
    };
    state.auditor.emit(
        event
            .with_actor(&user.subject_id)
            .with_request(meta.audit)
            .with_metadata(json!({
                "activityType": request.activity_type,
                "proofId": request.proof_id,
            })),
    );

    Ok(Json(result?.into()))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{first_party_token, json_body, send};
    use super::*;
    use axum::http::StatusCode;
    use chrono::Utc;

    use crate::config::tests::test_config;
    use crate::rewards::{signer_from_hex, RewardOracle, RewardTable};
    use crate::storage::{Auditor, LinkedIdentity, TrustDatabase};

    const CLAIMS: &str = "/v1/rewards/claims";
    const ORACLE_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    const WALLET: &str = "0x52908400098527886e0f7030069857d2e4169ee7";

    fn state_with_oracle() -> AppState {
        let oracle = RewardOracle::new(
            signer_from_hex(ORACLE_KEY).unwrap(),
            parse_address(CONTRACT).unwrap(),
            43114,
            RewardTable::default(),
        );
        AppState::new(
            test_config(),
            TrustDatabase::in_memory().unwrap(),
            Auditor::default(),
            Some(oracle),
        )
        .unwrap()
    }

    fn link_wallet(state: &AppState, subject_id: &str) {
        let identity = LinkedIdentity {
            subject_id: subject_id.to_string(),
            did: format!("did:pkh:eip155:43114:{WALLET}"),
            chain_id: 43114,
            wallet_address: state.cipher.encrypt(WALLET_ADDRESS_FIELD, WALLET).unwrap(),
            linked_at: Utc::now(),
        };
        IdentityRepository::new(&state.db).link(&identity).unwrap();
    }

    #[tokio::test]
    async fn claim_is_signed_once_per_proof() {
        let state = state_with_oracle();
        link_wallet(&state, "subject-1");
        let token = first_party_token(&state, "subject-1");
        let body = json!({"activityType": "post_created", "proofId": "post-42"});

        let response = send(&state, "POST", CLAIMS, Some(&token), Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let claim = json_body(response).await;
        assert_eq!(claim["walletAddress"], WALLET);
        assert_eq!(claim["amount"], "1000000000000000000");
        assert_eq!(claim["chainId"], 43114);
        assert_eq!(claim["signer"], state.oracle.as_ref().unwrap().address().to_string());

        let again = send(&state, "POST", CLAIMS, Some(&token), Some(body)).await;
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unlinked_subject_is_forbidden() {
        let state = state_with_oracle();
        let token = first_party_token(&state, "subject-2");
        let body = json!({"activityType": "post_created", "proofId": "post-1"});
        let response = send(&state, "POST", CLAIMS, Some(&token), Some(body)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_oracle_is_unavailable() {
        let state = AppState::for_tests();
        let token = first_party_token(&state, "subject-1");
        let body = json!({"activityType": "post_created", "proofId": "post-1"});
        let response = send(&state, "POST", CLAIMS, Some(&token), Some(body)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
