// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

diesel::table! {
    transfers (transfer_id) {
        transfer_id -> Text,
        receiver -> Text,
        amount -> Text,
        tx_reimbursement -> Text,
        gas_price -> Text,
        native_asset -> Text,
        wrapped_asset -> Text,
        source_chain_id -> Int8,
        target_chain_id -> Int8,
        native_chain_id -> Int8,
        status -> Text,
        eth_tx_hash -> Nullable<Text>,
        eth_submission_status -> Nullable<Text>,
        created_at -> Int8,
        updated_at -> Int8,
    }
}

diesel::table! {
    messages (transfer_id, signature) {
        transfer_id -> Text,
        signature -> Text,
        hash -> Text,
        signer -> Text,
        transaction_timestamp -> Int8,
    }
}

diesel::table! {
    status_cursors (stream_name) {
        stream_name -> Text,
        last_fetched -> Int8,
        updated_at -> Int8,
    }
}

diesel::allow_tables_to_appear_in_same_query!(transfers, messages, status_cursors);
