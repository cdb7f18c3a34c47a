//! Contract names and the ABI bindings used to talk to the T-REX suite.

use alloy_core::sol;
use serde::{Deserialize, Serialize};

/// Version registered in the implementation authority.
pub const TREX_VERSION: (u8, u8, u8) = (4, 0, 0);

/// Every compiled contract the infrastructure deployment needs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum ContractName {
    Token,
    ClaimTopicsRegistry,
    TrustedIssuersRegistry,
    IdentityRegistryStorage,
    IdentityRegistry,
    ModularCompliance,
    #[strum(serialize = "TREXImplementationAuthority")]
    #[serde(rename = "TREXImplementationAuthority")]
    ImplementationAuthority,
    IdFactory,
    #[strum(serialize = "TREXFactory")]
    #[serde(rename = "TREXFactory")]
    TrexFactory,
    #[strum(serialize = "TREXGateway")]
    #[serde(rename = "TREXGateway")]
    TrexGateway,
}

impl ContractName {
    /// The six stateless implementation contracts, in registration order.
    pub const IMPLEMENTATIONS: [ContractName; 6] = [
        ContractName::Token,
        ContractName::ClaimTopicsRegistry,
        ContractName::TrustedIssuersRegistry,
        ContractName::IdentityRegistryStorage,
        ContractName::IdentityRegistry,
        ContractName::ModularCompliance,
    ];

    /// Name of the artifact file (without extension) produced by the compiler.
    pub fn artifact_name(&self) -> &'static str {
        self.into()
    }

    /// Entry points the deployment calls on this contract after construction.
    ///
    /// Checked against the artifact interface before any transaction is sent.
    pub fn required_entry_points(&self) -> &'static [&'static str] {
        match self {
            ContractName::ImplementationAuthority => &["addAndUseTREXVersion", "setTREXFactory"],
            ContractName::TrexFactory => &["transferOwnership"],
            ContractName::TrexGateway => &[
                "setPublicDeploymentStatus",
                "getPublicDeploymentStatus",
                "isDeployer",
                "deployTREXSuite",
            ],
            _ => &[],
        }
    }
}

sol! {
    #![sol(all_derives)]

    struct Version {
        uint8 major;
        uint8 minor;
        uint8 patch;
    }

    struct TREXContracts {
        address tokenImplementation;
        address ctrImplementation;
        address irImplementation;
        address irsImplementation;
        address tirImplementation;
        address mcImplementation;
    }

    struct TokenDetails {
        address owner;
        string name;
        string symbol;
        uint8 decimals;
        address irs;
        address ONCHAINID;
        address[] irAgents;
        address[] tokenAgents;
        address[] complianceModules;
        bytes[] complianceSettings;
    }

    struct ClaimDetails {
        uint256[] claimTopics;
        address[] issuers;
        uint256[][] issuerClaims;
    }

    contract TREXImplementationAuthority {
        constructor(bool referenceStatus, address trexFactory, address iaFactory);
        function addAndUseTREXVersion(Version calldata _version, TREXContracts calldata _trex) external;
        function setTREXFactory(address trexFactory) external;
    }

    contract IdFactory {
        constructor(address implementationAuthority);
    }

    contract TREXFactory {
        constructor(address implementationAuthority_, address idFactory_);
        function transferOwnership(address newOwner) external;
        event TREXSuiteDeployed(address indexed _token, address _ir, address _irs, address _tir, address _ctr, address _mc, string indexed _salt);
    }

    contract TREXGateway {
        constructor(address factory, address owner);
        function setPublicDeploymentStatus(bool _isEnabled) external;
        function getPublicDeploymentStatus() external view returns (bool);
        function isDeployer(address deployer) external view returns (bool);
        function deployTREXSuite(TokenDetails memory _tokenDetails, ClaimDetails memory _claimDetails) external;
    }
}
