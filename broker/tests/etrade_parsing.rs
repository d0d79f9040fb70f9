//! Tests for E*TRADE response parsing and OAuth1 signing — no live connection needed.

#[cfg(feature = "etrade")]
mod etrade_tests {
    use chrono::NaiveDate;
    use divtrack::{OptionKind, Symbol};
    use divtrack_broker::BrokerError;
    use divtrack_broker::etrade::oauth;
    use divtrack_broker::etrade::types::{
        parse_accounts, parse_balance, parse_expiry_dates, parse_option_chain, parse_portfolio,
        parse_quotes, parse_token_form,
    };

    // ========================================================================
    // OAuth1 signing
    // ========================================================================

    fn twitter_params() -> Vec<(String, String)> {
        [
            ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn signature_base_reference_vector() {
        let base = oauth::signature_base(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &twitter_params(),
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue\
             %26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\
             %26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958\
             %26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0\
             %26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn signature_reference_vector() {
        let base = oauth::signature_base(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &twitter_params(),
        );
        let sig = oauth::sign(
            &base,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
        .unwrap();
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn query_parameters_change_the_signature() {
        let params = oauth::OAuthParams {
            consumer_key: "ck",
            consumer_secret: "cs",
            token: Some("at"),
            token_secret: "ts",
            extra: &[],
        };
        let url = "https://api.etrade.com/v1/accounts/k/portfolio";
        let a = oauth::authorization_header("GET", url, &[("pageNumber", "1")], &params, "n", 1)
            .unwrap();
        let b = oauth::authorization_header("GET", url, &[("pageNumber", "2")], &params, "n", 1)
            .unwrap();
        assert_ne!(a, b);
        assert!(a.contains("oauth_token=\"at\""));
        assert!(!a.contains("pageNumber"));
    }

    #[test]
    fn token_form_parsing() {
        let (token, secret) =
            parse_token_form("oauth_token=abc%2B1&oauth_token_secret=s%3D&oauth_callback_confirmed=true")
                .unwrap();
        assert_eq!(token, "abc+1");
        assert_eq!(secret, "s=");

        let err = parse_token_form("oauth_problem=consumer_key_rejected").unwrap_err();
        assert!(matches!(err, BrokerError::Auth(_)));
    }

    // ========================================================================
    // Accounts and balances
    // ========================================================================

    #[test]
    fn parse_account_list_skips_closed() {
        let json = r#"{
            "AccountListResponse": {
                "Accounts": {
                    "Account": [
                        {
                            "accountId": "84010429",
                            "accountIdKey": "JIdOIAcSpwR1Jva7RQBraQ",
                            "accountMode": "MARGIN",
                            "accountDesc": "INDIVIDUAL",
                            "accountName": "Dividends",
                            "accountType": "INDIVIDUAL",
                            "institutionType": "BROKERAGE",
                            "accountStatus": "ACTIVE"
                        },
                        {
                            "accountId": "84010430",
                            "accountIdKey": "xyz",
                            "accountDesc": "Rollover IRA",
                            "accountName": "",
                            "accountType": "ROLLOVERIRA",
                            "accountStatus": "ACTIVE"
                        },
                        {
                            "accountId": "99999999",
                            "accountIdKey": "closed",
                            "accountStatus": "CLOSED"
                        }
                    ]
                }
            }
        }"#;
        let accounts = parse_accounts(json).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "84010429");
        assert_eq!(accounts[0].key, "JIdOIAcSpwR1Jva7RQBraQ");
        assert_eq!(accounts[0].description, "Dividends");
        assert_eq!(accounts[1].description, "Rollover IRA");
        assert_eq!(accounts[1].kind, "ROLLOVERIRA");
    }

    #[test]
    fn parse_balance_realtime_value() {
        let json = r#"{
            "BalanceResponse": {
                "accountId": "84010429",
                "accountType": "INDIVIDUAL",
                "Computed": {
                    "cashAvailableForInvestment": 1200.5,
                    "cashBalance": 1250.75,
                    "RealTimeValues": { "totalAccountValue": 48250.1, "netMv": 47000.0 }
                }
            }
        }"#;
        let balance = parse_balance(json, "84010429").unwrap();
        assert_eq!(balance.cash, 1250.75);
        assert_eq!(balance.total_value, 48250.1);
    }

    #[test]
    fn parse_balance_missing_fields_default_to_zero() {
        let json = r#"{ "BalanceResponse": { "Computed": { "netCash": 10.0 } } }"#;
        let balance = parse_balance(json, "1").unwrap();
        assert_eq!(balance.cash, 10.0);
        assert_eq!(balance.total_value, 0.0);
    }

    // ========================================================================
    // Portfolio
    // ========================================================================

    #[test]
    fn parse_portfolio_stock_option_and_short() {
        let json = r#"{
            "PortfolioResponse": {
                "AccountPortfolio": [{
                    "accountId": "84010429",
                    "totalPages": 2,
                    "Position": [
                        {
                            "symbolDescription": "O",
                            "quantity": 100,
                            "positionType": "LONG",
                            "pricePaid": 52.1,
                            "marketValue": 6000.0,
                            "Quick": { "lastTrade": 60.0 },
                            "Product": { "symbol": "O", "securityType": "EQ" }
                        },
                        {
                            "symbolDescription": "KO Jan 17 '25 $60 Put",
                            "quantity": 1,
                            "positionType": "SHORT",
                            "pricePaid": 0.6,
                            "marketValue": -45.0,
                            "osiKey": "KO----250117P00060000",
                            "Quick": { "lastTrade": 0.45 },
                            "Product": { "symbol": "KO", "securityType": "OPTN", "callPut": "PUT" }
                        },
                        {
                            "symbolDescription": "",
                            "quantity": 5,
                            "Product": { "symbol": "", "securityType": "EQ" }
                        }
                    ]
                }]
            }
        }"#;
        let page = parse_portfolio(json, "84010429").unwrap();
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.positions.len(), 2);

        let stock = &page.positions[0];
        assert_eq!(stock.symbol.as_str(), "O");
        assert_eq!(stock.account, "84010429");
        assert_eq!(stock.quantity, 100.0);
        assert_eq!(stock.price_paid, 52.1);
        assert_eq!(stock.current_price, 60.0);

        let put = &page.positions[1];
        assert_eq!(put.symbol.as_str(), "KO----250117P00060000");
        assert_eq!(put.quantity, -1.0);
    }

    #[test]
    fn parse_portfolio_without_positions() {
        let json = r#"{ "PortfolioResponse": { "AccountPortfolio": [] } }"#;
        let page = parse_portfolio(json, "1").unwrap();
        assert!(page.positions.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    // ========================================================================
    // Quotes
    // ========================================================================

    #[test]
    fn parse_quotes_with_dividend_fields() {
        let json = r#"{
            "QuoteResponse": {
                "QuoteData": [
                    {
                        "dateTime": "15:59:59 EST 01-03-2025",
                        "quoteStatus": "CLOSING",
                        "All": {
                            "lastTrade": 60.0,
                            "annualDividend": 3.168,
                            "dividend": 0.264,
                            "yield": 5.28,
                            "exDividendDate": 1735603200,
                            "companyName": "REALTY INCOME CORP"
                        },
                        "Product": { "symbol": "O", "securityType": "EQ" }
                    },
                    {
                        "All": { "lastTrade": 25.0, "annualDividend": 0.0, "yield": 0.0, "exDividendDate": 0 },
                        "Product": { "symbol": "GROW", "securityType": "EQ" }
                    }
                ],
                "Messages": {
                    "Message": [{ "description": "Invalid Symbol: XYZ", "code": 1019, "type": "WARNING" }]
                }
            }
        }"#;
        let quotes = parse_quotes(json).unwrap();
        assert_eq!(quotes.len(), 2);

        let o = &quotes[0];
        assert_eq!(o.symbol, Symbol::new("O").unwrap());
        assert_eq!(o.annual_dividend, Some(3.168));
        assert_eq!(o.dividend_yield, Some(5.28));
        assert_eq!(o.ex_dividend_date, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(o.description, "REALTY INCOME CORP");

        let grow = &quotes[1];
        assert_eq!(grow.annual_dividend, None);
        assert_eq!(grow.ex_dividend_date, None);
        assert_eq!(grow.annual_dividend_per_share(), None);
    }

    #[test]
    fn parse_quotes_rejects_garbage() {
        assert!(matches!(
            parse_quotes("<html>down for maintenance</html>"),
            Err(BrokerError::Parse { .. })
        ));
    }

    // ========================================================================
    // Options
    // ========================================================================

    #[test]
    fn parse_expiry_dates_sorted() {
        let json = r#"{
            "OptionExpireDateResponse": {
                "ExpirationDate": [
                    { "year": 2025, "month": 2, "day": 21, "expiryType": "MONTHLY" },
                    { "year": 2025, "month": 1, "day": 17, "expiryType": "MONTHLY" },
                    { "year": 2025, "month": 1, "day": 24, "expiryType": "WEEKLY" }
                ]
            }
        }"#;
        let dates = parse_expiry_dates(json).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 24).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 21).unwrap(),
            ]
        );
    }

    #[test]
    fn parse_option_chain_calls_then_puts() {
        let json = r#"{
            "OptionChainResponse": {
                "OptionPair": [
                    {
                        "Call": { "displaySymbol": "KO Jan 17 '25 $62.50 Call", "osiKey": "KO----250117C00062500",
                                  "optionType": "CALL", "strikePrice": 62.5, "bid": 0.4, "ask": 0.45,
                                  "lastPrice": 0.42, "openInterest": 1200 },
                        "Put": { "displaySymbol": "KO Jan 17 '25 $62.50 Put", "osiKey": "KO----250117P00062500",
                                 "optionType": "PUT", "strikePrice": 62.5, "bid": 1.5, "ask": 1.6,
                                 "lastPrice": 1.55, "openInterest": 300 }
                    },
                    {
                        "Call": { "displaySymbol": "KO Jan 17 '25 $60 Call", "optionType": "CALL",
                                  "strikePrice": 60.0, "bid": 1.2, "ask": 1.3, "lastPrice": 1.25, "openInterest": 900 },
                        "Put": { "displaySymbol": "KO Jan 17 '25 $60 Put", "osiKey": "KO----250117P00060000",
                                 "optionType": "PUT", "strikePrice": 60.0, "bid": 0.6, "ask": 0.7,
                                 "lastPrice": 0.65, "openInterest": 10 }
                    }
                ],
                "SelectedED": { "month": 1, "year": 2025, "day": 17 }
            }
        }"#;
        let expiry = NaiveDate::from_ymd_opt(2025, 1, 17).unwrap();
        let chain = parse_option_chain(json, &Symbol::new("KO").unwrap(), expiry).unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0].kind, OptionKind::Call);
        assert_eq!(chain[0].strike, 60.0);
        assert_eq!(chain[0].symbol, "KO Jan 17 '25 $60 Call");
        assert_eq!(chain[2].kind, OptionKind::Put);
        assert_eq!(chain[2].symbol, "KO----250117P00060000");
        assert_eq!(chain[2].premium_yield_pct(), Some(1.0));
        assert_eq!(chain[3].open_interest, 300);
    }
}
